//! Configuration types with the documented defaults.
//!
//! Loading (files, env) is the host application's concern; the engine only
//! consumes these structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub max_concurrent_ingestions: usize,
    pub max_concurrent_analysis: usize,
    pub clone_timeout_minutes: u64,
    pub retry_attempts: u32,
    pub request_timeout_seconds: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ingestions: 5,
            max_concurrent_analysis: 5,
            clone_timeout_minutes: 10,
            retry_attempts: 3,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub deployment: String,
    pub max_batch_size: usize,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub rate_limit_protection: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            deployment: "text-embedding".to_string(),
            max_batch_size: 8,
            request_timeout_seconds: 60,
            retry_attempts: 3,
            rate_limit_protection: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub batch_size: usize,
    pub request_timeout_seconds: u64,
    pub minimum_search_score: f32,
    pub fuzzy: bool,
    pub semantic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            request_timeout_seconds: 120,
            minimum_search_score: 0.5,
            fuzzy: true,
            semantic: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentationConfig {
    pub deployment: String,
    pub max_tokens_per_section: u32,
    pub temperature: f32,
    pub max_concurrent_generations: usize,
    pub requests_per_minute: u32,
    pub max_tokens_per_day: u64,
    pub min_quality_score: f64,
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u32,
    pub enrich_sections: bool,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            deployment: "chat".to_string(),
            max_tokens_per_section: 4000,
            temperature: 0.3,
            max_concurrent_generations: 3,
            requests_per_minute: 20,
            max_tokens_per_day: 1_000_000,
            min_quality_score: 0.7,
            min_content_length: 100,
            max_content_length: 50_000,
            request_timeout_seconds: 120,
            retry_attempts: 3,
            enrich_sections: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub retention_days: i64,
    pub max_conversations_per_user: usize,
    pub max_messages_per_conversation: usize,
    pub auto_archive_after_hours: i64,
    pub cleanup_interval_hours: u64,
    pub cleanup_batch_size: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            max_conversations_per_user: 100,
            max_messages_per_conversation: 200,
            auto_archive_after_hours: 168,
            cleanup_interval_hours: 24,
            cleanup_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub deployment: String,
    pub max_tokens_per_response: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_context_items: usize,
    pub max_conversation_history: usize,
    pub max_context_tokens: usize,
    pub max_prompt_tokens: usize,
    pub min_confidence_threshold: f64,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            deployment: "chat".to_string(),
            max_tokens_per_response: 3000,
            temperature: 0.7,
            top_p: 0.95,
            max_context_items: 10,
            max_conversation_history: 20,
            max_context_tokens: 8000,
            max_prompt_tokens: 12_000,
            min_confidence_threshold: 0.3,
            request_timeout_seconds: 60,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub max_file_content_length: usize,
    pub chunk_overlap_ratio: f32,
    pub refresh_interval_seconds: u64,
    pub enable_incremental: bool,
    pub max_concurrent_indexing_operations: usize,
    pub excluded_extensions: Vec<String>,
    pub ignored_directories: Vec<String>,
}

impl IndexingConfig {
    pub fn is_extension_excluded(&self, path: &str) -> bool {
        match path.rsplit('.').next() {
            Some(ext) if !ext.is_empty() && ext.len() < path.len() => self
                .excluded_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    pub fn is_directory_ignored(&self, path: &str) -> bool {
        path.split('/')
            .any(|seg| self.ignored_directories.iter().any(|d| d == seg))
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_content_length: 32_768,
            chunk_overlap_ratio: 0.10,
            refresh_interval_seconds: 21_600,
            enable_incremental: true,
            max_concurrent_indexing_operations: 5,
            excluded_extensions: [
                "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "mp3", "mp4", "avi",
                "mov", "wav", "flac", "zip", "tar", "gz", "bz2", "7z", "rar", "exe", "dll", "so",
                "dylib", "bin", "o", "a", "class", "jar", "pyc", "pdf", "woff", "woff2", "ttf",
                "eot",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignored_directories: [
                ".git",
                "node_modules",
                "target",
                "dist",
                "build",
                "out",
                "bin",
                "obj",
                "vendor",
                "__pycache__",
                ".venv",
                "venv",
                ".idea",
                ".vscode",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub max_entities_per_repository: usize,
    pub batch_size_for_entity_processing: usize,
    pub min_relationship_confidence: f32,
    pub min_pattern_confidence: f64,
    pub max_relationship_depth: usize,
    pub graph_refresh_interval_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_entities_per_repository: 50_000,
            batch_size_for_entity_processing: 100,
            min_relationship_confidence: 0.6,
            min_pattern_confidence: 0.7,
            max_relationship_depth: 3,
            graph_refresh_interval_seconds: 21_600,
        }
    }
}

/// Everything in one place, for hosts that want a single struct to override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ingestion: IngestionConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub documentation: DocumentationConfig,
    pub conversation: ConversationConfig,
    pub assistant: AssistantConfig,
    pub indexing: IndexingConfig,
    pub graph: GraphConfig,
}

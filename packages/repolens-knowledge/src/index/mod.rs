//! Hybrid content index: lexical (tantivy) + vector (cosine) over file
//! chunks, documentation sections and conversation messages.

pub mod chunker;
pub mod hybrid;
pub mod lexical;
pub mod masking;
pub mod schema;
pub mod vector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repolens_core::error::Result;

/// Document families sharing the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFamily {
    CodeChunk,
    DocSection,
    Message,
}

impl DocumentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFamily::CodeChunk => "code_chunk",
            DocumentFamily::DocSection => "doc_section",
            DocumentFamily::Message => "message",
        }
    }
}

/// One indexable document. The id is stable, making upserts idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub repository_id: String,
    pub family: DocumentFamily,
    pub title: String,
    pub path: Option<String>,
    pub language: Option<String>,
    pub section_type: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

impl SearchDocument {
    pub fn new(
        id: impl Into<String>,
        repository_id: impl Into<String>,
        family: DocumentFamily,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            repository_id: repository_id.into(),
            family,
            title: title.into(),
            path: None,
            language: None,
            section_type: None,
            start_line: None,
            end_line: None,
            content: content.into(),
            tags: Vec::new(),
            vector: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Empty means all repositories.
    pub repository_ids: Vec<String>,
    /// Empty means all families.
    pub families: Vec<DocumentFamily>,
}

impl SearchFilter {
    pub fn repositories(ids: &[String]) -> Self {
        Self {
            repository_ids: ids.to_vec(),
            families: Vec::new(),
        }
    }

    pub fn matches(&self, document: &SearchDocument) -> bool {
        (self.repository_ids.is_empty() || self.repository_ids.contains(&document.repository_id))
            && (self.families.is_empty() || self.families.contains(&document.family))
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Pre-embedded query for the vector leg; lexical-only when absent.
    pub query_vector: Option<Vec<f32>>,
    pub filter: SearchFilter,
    pub limit: usize,
}

/// A hit carrying both ranking legs so callers can rerank.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: SearchDocument,
    /// Max-normalized lexical score in `[0, 1]`.
    pub lexical_score: f64,
    /// Cosine similarity in `[0, 1]` (0 when no vector).
    pub vector_score: f64,
    /// Fused score used for the index's own ordering.
    pub score: f64,
}

/// Hybrid search index capability.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Idempotent by document id.
    async fn upsert(&self, documents: Vec<SearchDocument>) -> Result<usize>;
    async fn delete(&self, ids: &[String]) -> Result<usize>;
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>>;
    async fn document_count(&self) -> Result<usize>;
    /// Documents of one repository (cascade deletes, reindex diffing).
    async fn ids_for_repository(&self, repository_id: &str) -> Result<Vec<String>>;
}

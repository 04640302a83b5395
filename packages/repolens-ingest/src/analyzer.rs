//! Repository analyzer: structural analysis of a connected repository.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use repolens_core::error::Result;
use repolens_core::ids;
use repolens_core::models::{
    FileRole, ImportantFile, ProjectKind, Repository, RepositoryAnalysisContext,
};

use crate::host::{Credential, SourceHost, TreeEntry};
use crate::languages;
use crate::manifests;

/// Cap on the important-file shortlist.
pub const MAX_IMPORTANT_FILES: usize = 64;

/// Produces a [`RepositoryAnalysisContext`] from a tree + blobs.
pub struct RepositoryAnalyzer;

impl RepositoryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub async fn analyze(
        &self,
        repo: &Repository,
        host: &dyn SourceHost,
        credential: Option<&Credential>,
    ) -> Result<RepositoryAnalysisContext> {
        let branch = repo.default_branch.clone();
        let tree = host.list_tree(repo, &branch, credential).await?;
        debug!(repository = %repo.id, files = tree.len(), "analyzing repository tree");

        let statistics = host.analyze_structure(repo, &branch, credential).await?;
        let primary_language = languages::primary_language(&statistics);
        let languages_present: Vec<String> =
            statistics.language_breakdown.keys().cloned().collect();

        let important_files = select_important_files(&tree);

        // Dependency manifests for every detected ecosystem.
        let mut dependencies = Vec::new();
        for entry in &tree {
            let file_name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
            if languages::is_manifest_name(&file_name.to_ascii_lowercase()) {
                let bytes = host.read_file(repo, &branch, &entry.path, credential).await?;
                let content = String::from_utf8_lossy(&bytes);
                dependencies.extend(manifests::parse_manifest(&entry.path, &content));
            }
        }

        let project_kind = classify_project(&tree, dependencies.len());
        let pattern_hints = detect_pattern_hints(&tree);

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "inventory_digest".to_string(),
            inventory_digest_for(&tree),
        );

        info!(
            repository = %repo.id,
            primary_language = %primary_language,
            important = important_files.len(),
            dependencies = dependencies.len(),
            "repository analysis complete"
        );

        Ok(RepositoryAnalysisContext {
            repository_id: repo.id.clone(),
            primary_language,
            languages: languages_present,
            project_kind,
            dependencies,
            pattern_hints,
            important_files,
            statistics,
            metadata,
        })
    }

    /// Change detection: head commit newer than `since`, or a differing
    /// file inventory digest.
    pub async fn has_repository_changed(
        &self,
        repo: &Repository,
        since: Option<DateTime<Utc>>,
        previous_digest: Option<&str>,
        host: &dyn SourceHost,
        credential: Option<&Credential>,
    ) -> Result<bool> {
        let branch = repo.default_branch.clone();

        if let Some(since) = since {
            let head = host.list_commits(repo, &branch, 1, credential).await?;
            if let Some(head) = head.first() {
                if head.timestamp > since {
                    return Ok(true);
                }
            }
        }

        let tree = host.list_tree(repo, &branch, credential).await?;
        let digest = inventory_digest_for(&tree);
        Ok(match previous_digest {
            Some(previous) => digest != previous,
            None => true,
        })
    }
}

impl Default for RepositoryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn inventory_digest_for(tree: &[TreeEntry]) -> String {
    ids::inventory_digest(tree.iter().map(|e| (e.path.as_str(), e.size)))
}

/// Rank = role weight + size decile + known-name bonus; top N ≤ 64.
fn select_important_files(tree: &[TreeEntry]) -> Vec<ImportantFile> {
    let mut sizes: Vec<u64> = tree.iter().map(|e| e.size).collect();
    sizes.sort_unstable();

    let decile = |size: u64| -> f64 {
        if sizes.is_empty() {
            return 0.0;
        }
        let rank = sizes.partition_point(|&s| s <= size);
        (rank * 10 / sizes.len().max(1)).min(9) as f64 / 10.0
    };

    let mut scored: Vec<ImportantFile> = tree
        .iter()
        .filter_map(|entry| {
            let language = languages::language_for_path(&entry.path)?;
            let role = languages::role_for_path(&entry.path);
            let score = role.weight() + decile(entry.size) + languages::known_name_bonus(&entry.path);
            Some(ImportantFile {
                path: entry.path.clone(),
                language: language.to_string(),
                role,
                size_bytes: entry.size,
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    scored.truncate(MAX_IMPORTANT_FILES);
    scored
}

fn classify_project(tree: &[TreeEntry], dependency_count: usize) -> ProjectKind {
    let has = |name: &str| {
        tree.iter()
            .any(|e| e.path.rsplit('/').next() == Some(name))
    };
    let has_entry = tree.iter().any(|e| {
        matches!(
            languages::role_for_path(&e.path),
            FileRole::EntryPoint
        )
    });

    let manifest_count = tree
        .iter()
        .filter(|e| {
            let name = e.path.rsplit('/').next().unwrap_or("").to_ascii_lowercase();
            languages::is_manifest_name(&name)
        })
        .count();

    if manifest_count > 1 {
        ProjectKind::Workspace
    } else if has("Dockerfile") || has("docker-compose.yml") {
        ProjectKind::Service
    } else if has_entry {
        ProjectKind::Application
    } else if dependency_count > 0 || manifest_count == 1 {
        ProjectKind::Library
    } else {
        ProjectKind::Unknown
    }
}

/// Coarse layout hints; the graph builder owns authoritative detection.
fn detect_pattern_hints(tree: &[TreeEntry]) -> Vec<String> {
    let mut hints = Vec::new();
    let has_dir = |dir: &str| {
        tree.iter()
            .any(|e| e.path.split('/').any(|seg| seg.eq_ignore_ascii_case(dir)))
    };

    if has_dir("controllers") && (has_dir("models") || has_dir("views")) {
        hints.push("mvc_layout".to_string());
    }
    if has_dir("domain") && (has_dir("infrastructure") || has_dir("application")) {
        hints.push("layered_architecture".to_string());
    }
    if has_dir("services") {
        hints.push("service_layer".to_string());
    }
    if has_dir("tests") || has_dir("test") {
        hints.push("tests_present".to_string());
    }
    hints
}

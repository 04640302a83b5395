//! Structural analysis produced by the repository analyzer and consumed by
//! the graph builder and the documentation generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::repository::RepositoryStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Application,
    Library,
    Service,
    Workspace,
    Unknown,
}

impl Default for ProjectKind {
    fn default() -> Self {
        ProjectKind::Unknown
    }
}

/// Structural role of a file within the repository layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    EntryPoint,
    Config,
    Build,
    Test,
    Documentation,
    Source,
}

impl FileRole {
    /// Rank weight used by important-file selection.
    pub fn weight(&self) -> f64 {
        match self {
            FileRole::EntryPoint => 3.0,
            FileRole::Build => 2.5,
            FileRole::Config => 1.5,
            FileRole::Documentation => 1.5,
            FileRole::Source => 1.0,
            FileRole::Test => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantFile {
    pub path: String,
    pub language: String,
    pub role: FileRole,
    pub size_bytes: u64,
    pub score: f64,
}

/// One dependency record parsed from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub name: String,
    pub version: Option<String>,
    /// Ecosystem tag, e.g. `cargo`, `npm`, `go`, `pip`.
    pub ecosystem: String,
    pub dev_only: bool,
}

/// Output of the repository analyzer (C2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryAnalysisContext {
    pub repository_id: String,
    pub primary_language: String,
    pub languages: Vec<String>,
    pub project_kind: ProjectKind,
    pub dependencies: Vec<DependencyInfo>,
    /// Coarse hints only; authoritative detection happens in the graph builder.
    pub pattern_hints: Vec<String>,
    pub important_files: Vec<ImportantFile>,
    pub statistics: RepositoryStatistics,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

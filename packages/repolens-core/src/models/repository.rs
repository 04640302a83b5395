//! Repository aggregate and its lifecycle state machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/@]+(:\d+)?(/[^\s]*)?$").expect("url regex"));

/// Repository lifecycle status. Transitions are restricted to the edge
/// table in [`RepositoryStatus::can_transition`]; everything else is an
/// [`Error::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Connecting,
    Connected,
    Analyzing,
    Ready,
    Error,
    Disconnected,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Connecting => "connecting",
            RepositoryStatus::Connected => "connected",
            RepositoryStatus::Analyzing => "analyzing",
            RepositoryStatus::Ready => "ready",
            RepositoryStatus::Error => "error",
            RepositoryStatus::Disconnected => "disconnected",
        }
    }

    /// Edge table: `(from, to)` pairs the Orchestrator may take.
    /// `Disconnected` is reachable from every state.
    pub fn can_transition(from: RepositoryStatus, to: RepositoryStatus) -> bool {
        use RepositoryStatus::*;
        if to == Disconnected {
            return from != Disconnected;
        }
        matches!(
            (from, to),
            (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Analyzing)
                | (Connected, Error)
                | (Analyzing, Ready)
                | (Analyzing, Error)
                | (Ready, Analyzing)
                | (Disconnected, Connecting)
                | (Disconnected, Error)
        )
    }
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-language share of the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageStat {
    pub file_count: usize,
    pub line_count: usize,
    /// Share of total line count, in `[0, 100]`.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStatistics {
    pub file_count: usize,
    pub line_count: usize,
    pub language_breakdown: BTreeMap<String, LanguageStat>,
}

impl RepositoryStatistics {
    /// Breakdown percentages must sum to 100 ± 0.5 (or 0 for an empty repo).
    pub fn percentages_consistent(&self) -> bool {
        if self.language_breakdown.is_empty() {
            return true;
        }
        let sum: f64 = self
            .language_breakdown
            .values()
            .map(|s| s.percentage)
            .sum();
        (sum - 100.0).abs() <= 0.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub repository_id: String,
}

impl Commit {
    pub fn new(
        hash: impl Into<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
        repository_id: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            hash: hash.into(),
            message: if message.trim().is_empty() {
                "No commit message".to_string()
            } else {
                message
            },
            author: author.into(),
            timestamp,
            repository_id: repository_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub is_default: bool,
    pub repository_id: String,
    pub created_at: DateTime<Utc>,
    pub last_commit: Option<Commit>,
}

/// Repository aggregate. Created by an ingestion request and mutated only
/// through the Orchestrator; deletion cascades to graph, index and
/// documentation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Normalized `owner/name`; doubles as the stable repository id.
    pub id: String,
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub url: String,
    pub clone_url: String,
    pub primary_language: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    pub is_fork: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_pushed_at: Option<DateTime<Utc>>,
    pub status: RepositoryStatus,
    pub branches: Vec<Branch>,
    pub statistics: RepositoryStatistics,
}

impl Repository {
    /// Normalized constructor used by source adapters.
    pub fn connect(owner: impl Into<String>, name: impl Into<String>, url: &str) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();

        if owner.trim().is_empty() || name.trim().is_empty() {
            return Err(Error::validation("repository owner and name are required"));
        }
        if !URL_RE.is_match(url) {
            return Err(Error::validation(format!(
                "not an absolute http(s) url: {url}"
            )));
        }

        let full_name = format!("{}/{}", owner, name);
        let clone_url = if url.ends_with(".git") {
            url.to_string()
        } else {
            format!("{}.git", url.trim_end_matches('/'))
        };

        let now = Utc::now();
        Ok(Self {
            id: full_name.clone(),
            name,
            owner,
            full_name,
            url: url.to_string(),
            clone_url,
            primary_language: String::new(),
            description: None,
            default_branch: "main".to_string(),
            is_private: false,
            is_fork: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
            last_pushed_at: None,
            status: RepositoryStatus::Connecting,
            branches: Vec::new(),
            statistics: RepositoryStatistics::default(),
        })
    }

    /// Apply a lifecycle transition, rejecting non-edges.
    pub fn transition(&mut self, to: RepositoryStatus) -> Result<()> {
        if !RepositoryStatus::can_transition(self.status, to) {
            return Err(Error::invalid_transition(
                self.status.as_str(),
                to.as_str(),
            ));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the branch list, enforcing the single-default invariant.
    pub fn set_branches(&mut self, branches: Vec<Branch>) -> Result<()> {
        if !branches.is_empty() {
            let defaults = branches.iter().filter(|b| b.is_default).count();
            if defaults != 1 {
                return Err(Error::validation(format!(
                    "expected exactly one default branch, found {defaults}"
                )));
            }
        }
        self.branches = branches;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn default_branch_head(&self) -> Option<&Commit> {
        self.branches
            .iter()
            .find(|b| b.is_default)
            .and_then(|b| b.last_commit.as_ref())
    }
}

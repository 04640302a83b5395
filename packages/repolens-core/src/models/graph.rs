//! Knowledge-graph aggregate and its build state machine.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphStatus {
    NotBuilt,
    Building,
    Analyzing,
    Complete,
    Error,
    UpdateRequired,
}

impl GraphStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphStatus::NotBuilt => "not_built",
            GraphStatus::Building => "building",
            GraphStatus::Analyzing => "analyzing",
            GraphStatus::Complete => "complete",
            GraphStatus::Error => "error",
            GraphStatus::UpdateRequired => "update_required",
        }
    }

    /// Edge table for the build lifecycle.
    pub fn can_transition(from: GraphStatus, to: GraphStatus) -> bool {
        use GraphStatus::*;
        matches!(
            (from, to),
            (NotBuilt, Building)
                | (Building, Analyzing)
                | (Analyzing, Complete)
                | (Building, Error)
                | (Analyzing, Error)
                | (Error, Building)
                | (Complete, UpdateRequired)
                | (UpdateRequired, Building)
        )
    }
}

impl std::fmt::Display for GraphStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub pattern_count: usize,
    pub entities_by_kind: BTreeMap<String, usize>,
    pub relationships_by_kind: BTreeMap<String, usize>,
    /// `relationship_count / entity_count`, 0 for an empty graph.
    pub density: f64,
}

/// Knowledge-graph aggregate spanning one or more repositories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub id: String,
    pub repository_ids: Vec<String>,
    pub status: GraphStatus,
    pub statistics: GraphStatistics,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeGraph {
    pub fn new(repository_ids: Vec<String>) -> Result<Self> {
        if repository_ids.is_empty() {
            return Err(Error::validation("graph needs at least one repository"));
        }
        let distinct: BTreeSet<_> = repository_ids.iter().collect();
        if distinct.len() != repository_ids.len() {
            return Err(Error::validation("duplicate repository ids in graph"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            repository_ids,
            status: GraphStatus::NotBuilt,
            statistics: GraphStatistics::default(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transition(&mut self, to: GraphStatus) -> Result<()> {
        if !GraphStatus::can_transition(self.status, to) {
            return Err(Error::invalid_transition(self.status.as_str(), to.as_str()));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_distinct_nonempty_repos() {
        assert!(KnowledgeGraph::new(vec![]).is_err());
        assert!(KnowledgeGraph::new(vec!["a".into(), "a".into()]).is_err());
        assert!(KnowledgeGraph::new(vec!["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn test_build_walk() {
        let mut g = KnowledgeGraph::new(vec!["a/b".into()]).unwrap();
        g.transition(GraphStatus::Building).unwrap();
        g.transition(GraphStatus::Analyzing).unwrap();
        g.transition(GraphStatus::Complete).unwrap();
        g.transition(GraphStatus::UpdateRequired).unwrap();
        g.transition(GraphStatus::Building).unwrap();
    }

    #[test]
    fn test_error_and_rebuild() {
        let mut g = KnowledgeGraph::new(vec!["a/b".into()]).unwrap();
        g.transition(GraphStatus::Building).unwrap();
        g.transition(GraphStatus::Error).unwrap();
        g.transition(GraphStatus::Building).unwrap();
        assert_eq!(g.status, GraphStatus::Building);
    }

    #[test]
    fn test_non_edges_rejected() {
        let mut g = KnowledgeGraph::new(vec!["a/b".into()]).unwrap();
        assert!(g.transition(GraphStatus::Complete).is_err());
        assert!(g.transition(GraphStatus::Analyzing).is_err());
        g.transition(GraphStatus::Building).unwrap();
        assert!(g.transition(GraphStatus::Complete).is_err());
        assert!(g.transition(GraphStatus::NotBuilt).is_err());
    }
}

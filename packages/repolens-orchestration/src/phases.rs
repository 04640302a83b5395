//! Ingestion sub-steps. Each phase checkpoints on completion so crash
//! recovery resumes at the last completed sub-step.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestPhase {
    /// Structural analysis of the repository tree.
    Structure,
    /// Important-file fetch + entity extraction input.
    Entities,
    /// Knowledge-graph build.
    Graph,
    /// Content-index chunking and upserts.
    Index,
}

impl IngestPhase {
    pub const ORDER: [IngestPhase; 4] = [
        IngestPhase::Structure,
        IngestPhase::Entities,
        IngestPhase::Graph,
        IngestPhase::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPhase::Structure => "structure",
            IngestPhase::Entities => "entities",
            IngestPhase::Graph => "graph",
            IngestPhase::Index => "index",
        }
    }

    /// Cache key scoped to the repository snapshot (inventory digest), so
    /// a changed tree never resumes from stale phase output.
    pub fn cache_key(&self, repository_id: &str, digest: &str) -> String {
        format!("{}:{}:{}", self.as_str(), repository_id, digest)
    }
}

impl std::fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_scoped_by_digest() {
        let a = IngestPhase::Entities.cache_key("acme/svc", "digest1");
        let b = IngestPhase::Entities.cache_key("acme/svc", "digest2");
        assert_ne!(a, b);
        assert_eq!(a, "entities:acme/svc:digest1");
    }

    #[test]
    fn test_order_is_total() {
        assert_eq!(IngestPhase::ORDER.len(), 4);
        assert_eq!(IngestPhase::ORDER[0], IngestPhase::Structure);
        assert_eq!(IngestPhase::ORDER[3], IngestPhase::Index);
    }
}

//! Knowledge graph: store capability, build pipeline, pattern detection.

pub mod builder;
pub mod patterns;
pub mod store;

pub use builder::{GraphBuildReport, GraphBuilder, RepositorySource};
pub use patterns::{default_detectors, PatternDetector};
pub use store::{GraphStore, InMemoryGraphStore};

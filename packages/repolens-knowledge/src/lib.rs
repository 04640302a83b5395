//! Knowledge layer: the code graph and the hybrid content index.
//!
//! - `graph`: `GraphStore` capability, in-memory store with path queries,
//!   the build pipeline and architectural pattern detectors.
//! - `index`: `SearchIndex` capability, tantivy lexical + cosine vector
//!   legs, file chunking and privacy masking.

pub mod graph;
pub mod index;

pub use graph::{
    GraphBuildReport, GraphBuilder, GraphStore, InMemoryGraphStore, RepositorySource,
};
pub use index::{
    hybrid::HybridIndex, DocumentFamily, SearchDocument, SearchFilter, SearchHit, SearchIndex,
    SearchRequest,
};

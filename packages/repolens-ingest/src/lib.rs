//! Repository ingestion: source host access, structural analysis, entity
//! extraction.
//!
//! - `host`: the read-only `SourceHost` capability plus adapter helpers.
//! - `fixture`: in-memory host with scripted fault injection.
//! - `languages`: path classification and language statistics.
//! - `analyzer`: structural analysis (`RepositoryAnalysisContext`).
//! - `manifests`: per-ecosystem dependency manifest parsing.
//! - `extract`: tree-sitter entity extraction, heuristic fallback,
//!   cross-file linkage.
//! - `embed`: batched content embedding.

pub mod analyzer;
pub mod embed;
pub mod extract;
pub mod fixture;
pub mod host;
pub mod languages;
pub mod manifests;

pub use analyzer::RepositoryAnalyzer;
pub use embed::EntityEmbedder;
pub use extract::{EntityExtractor, ParsedFile, SymbolReference};
pub use fixture::{Fault, FixtureHost, RepoFixture};
pub use host::{Credential, SourceHost, TreeEntry};

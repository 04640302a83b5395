//! Shared kernel of the RepoLens engine.
//!
//! Everything the subsystem crates have in common lives here:
//!
//! - the domain model (`models`): value-type aggregates whose state machines
//!   are explicit edge tables returning `Result`,
//! - the shared error taxonomy (`error`),
//! - configuration defaults (`config`),
//! - the in-process event bus (`events`) including per-conversation
//!   streamed-response sequencing,
//! - the LLM/embedding capability contracts (`llm`),
//! - retry and quota primitives (`retry`, `quota`),
//! - stable id construction (`ids`).
//!
//! No module in this crate performs I/O beyond channel sends; concrete
//! capability implementations are injected by the host or the test suite.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod llm;
pub mod models;
pub mod quota;
pub mod retry;

pub use error::{Error, Result};

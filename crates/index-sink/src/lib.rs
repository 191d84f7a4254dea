//! Search index sink abstraction.
//!
//! This crate defines the `IndexSink` trait the runner writes through, plus
//! two sinks that need no external service:
//!
//! - `MemoryIndex` keeps documents in process and records every call
//! - `DryRunSink` only logs what would be written
//!
//! The HTTP implementation for Meilisearch lives in `meilisearch-sink`.

mod dry_run;
mod memory;
mod traits;

pub use dry_run::DryRunSink;
pub use memory::{document_key, MemoryIndex, SinkCall};
pub use traits::IndexSink;

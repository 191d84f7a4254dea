//! Core types for the index-sync framework.
//!
//! This crate provides the vocabulary shared by connectors, index sinks and
//! the runner:
//!
//! - [`Source`] / [`SyncTarget`] - what to replicate, from where, into which index
//! - [`ChangeEvent`] / [`DataEvent`] - one entry of a source's change stream
//! - [`EventBatch`] - per-target buffer of events waiting for a flush
//! - [`Statistics`] / [`SyncLog`] - per-target event counters and their durable form
//! - [`Catalog`] - sources and sync targets loaded from YAML
//! - [`SourceConnector`] / [`ChangeStream`] / [`ConnectorFactory`] - the connector seam
//!
//! # Architecture
//!
//! ```text
//! checkpoint (ProgressMarker)
//!    │
//! sync-core (this crate)
//!    │
//!    ├─── index-sink          (IndexSink trait, in-memory and dry-run sinks)
//!    ├─── meilisearch-sink    (HTTP sink)
//!    ├─── jsonl-source        (JSONL change-log connector)
//!    └─── index-sync          (runner, scheduler, CLI)
//! ```

pub mod batch;
pub mod catalog;
pub mod event;
pub mod source;
pub mod stats;
pub mod types;

// Re-exports for convenience
pub use batch::EventBatch;
pub use catalog::{Catalog, CatalogError};
pub use checkpoint::ProgressMarker;
pub use event::{ChangeEvent, DataEvent, Document, EventKind};
pub use source::{ChangeStream, ConnectorFactory, FullDataStream, SourceConnector};
pub use stats::{Statistics, SyncLog};
pub use types::{Batching, Source, SourceId, SyncId, SyncTarget, DEFAULT_FULL_SYNC_CHUNK_SIZE};

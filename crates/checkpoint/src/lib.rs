//! Progress checkpoints for index-sync
//!
//! Every source runner owns exactly one resumable position: an opaque,
//! connector-defined [`ProgressMarker`] (a log offset, a binlog file and
//! position, a resume token...). This crate stores those markers so a runner
//! can pick up where it left off after a restart.
//!
//! # Architecture
//!
//! - [`ProgressMarker`] wraps the connector's JSON value without interpreting it
//! - [`ProgressStore`] abstracts the storage backend (`get`/`set`/`reset`)
//! - [`StoredProgress`] is the envelope persisted by backends
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file per progress key
//! - `MemoryStore` - Process-local map, used by tests and dry runs
//!
//! Keys are chosen by the caller. index-sync uses `progress:<source id>`.

mod filesystem;
mod marker;
mod memory;
pub mod store;


pub use filesystem::FilesystemStore;
pub use marker::ProgressMarker;
pub use memory::MemoryStore;
pub use store::{ProgressStore, StoredProgress};

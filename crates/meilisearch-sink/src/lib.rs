//! Meilisearch index sink
//!
//! Writes change events to a Meilisearch server over its HTTP API:
//!
//! - create/update: `POST /indexes/{uid}/documents?primaryKey=<pk>`
//! - delete: `POST /indexes/{uid}/documents/delete-batch`
//! - index existence: `GET /indexes/{uid}`
//!
//! Meilisearch enqueues every write as a task and processes tasks of an
//! index in enqueue order, so sending requests in event order is enough to
//! keep the index consistent with the source.

mod client;
mod error;
mod write;

pub use client::{MeiliConfig, MeilisearchSink};
pub use error::MeiliError;
pub use write::{plan_batch, WriteOp};

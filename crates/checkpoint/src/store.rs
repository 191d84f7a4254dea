//! Progress storage trait and types
//!
//! This module defines the ProgressStore trait for backend-agnostic
//! progress storage operations, plus the persisted envelope.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProgressMarker;

/// Progress data stored in a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProgress {
    /// Key the marker was stored under (e.g. "progress:3")
    pub key: String,
    /// The connector's marker, verbatim
    pub marker: ProgressMarker,
    /// Timestamp of the last write
    pub updated_at: DateTime<Utc>,
}

/// Trait for progress storage operations.
///
/// One key holds at most one marker. `set` overwrites, `reset` removes the
/// marker so the next `get` reports "start from the beginning".
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Read the marker stored under `key`.
    ///
    /// Returns None if nothing was stored or the key was reset.
    async fn get(&self, key: &str) -> Result<Option<ProgressMarker>>;

    /// Store `marker` under `key`, replacing any previous value.
    async fn set(&self, key: &str, marker: &ProgressMarker) -> Result<()>;

    /// Forget the marker stored under `key`. Resetting a missing key is not an error.
    async fn reset(&self, key: &str) -> Result<()>;
}

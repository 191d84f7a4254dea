//! Stores that fail on demand.

use anyhow::{bail, Result};
use async_trait::async_trait;
use checkpoint::{MemoryStore, ProgressMarker, ProgressStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sync_core::SyncLog;

use crate::sync_log::{MemorySyncLog, SyncLogStore};

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// [`MemoryStore`] whose next `fail_sets` writes fail.
#[derive(Default)]
pub struct FlakyProgressStore {
    inner: Arc<MemoryStore>,
    fail_sets: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyProgressStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_sets: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_sets(&self, n: usize) {
        self.fail_sets.store(n, Ordering::SeqCst);
    }

    /// Every `set` call so far, failed or not.
    pub fn set_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }
}

#[async_trait]
impl ProgressStore for FlakyProgressStore {
    async fn get(&self, key: &str) -> Result<Option<ProgressMarker>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, marker: &ProgressMarker) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_sets) {
            bail!("progress store unavailable");
        }
        self.inner.set(key, marker).await
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.inner.reset(key).await
    }
}

/// [`MemorySyncLog`] whose next `fail_appends` writes fail.
#[derive(Default)]
pub struct FlakySyncLog {
    inner: MemorySyncLog,
    fail_appends: AtomicUsize,
}

impl FlakySyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_appends(&self, n: usize) {
        self.fail_appends.store(n, Ordering::SeqCst);
    }

    pub fn logs(&self) -> Vec<SyncLog> {
        self.inner.logs()
    }
}

#[async_trait]
impl SyncLogStore for FlakySyncLog {
    async fn append(&self, logs: Vec<SyncLog>) -> Result<()> {
        if take_failure(&self.fail_appends) {
            bail!("sync log unavailable");
        }
        self.inner.append(logs).await
    }
}

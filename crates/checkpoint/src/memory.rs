//! In-memory progress storage.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::ProgressStore;
use crate::ProgressMarker;

/// Process-local [`ProgressStore`].
///
/// Besides the current value per key it keeps every write in order
/// (`None` for a reset), which makes checkpoint sequences observable.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    current: HashMap<String, ProgressMarker>,
    history: HashMap<String, Vec<Option<ProgressMarker>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `set`/`reset` applied to `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<Option<ProgressMarker>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.history.get(key).cloned().unwrap_or_default()
    }

    fn record(&self, key: &str, marker: Option<ProgressMarker>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &marker {
            Some(m) => {
                inner.current.insert(key.to_string(), m.clone());
            }
            None => {
                inner.current.remove(key);
            }
        }
        inner.history.entry(key.to_string()).or_default().push(marker);
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<ProgressMarker>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.current.get(key).cloned())
    }

    async fn set(&self, key: &str, marker: &ProgressMarker) -> Result<()> {
        self.record(key, Some(marker.clone()));
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        self.record(key, None);
        Ok(())
    }
}

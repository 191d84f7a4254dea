//! Index sink with a pause gate and failure injection.

use anyhow::{bail, Result};
use async_trait::async_trait;
use index_sink::{IndexSink, MemoryIndex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync_core::{DataEvent, Document, SyncTarget};
use tokio::sync::watch;

/// Wraps a [`MemoryIndex`]. While paused, every write waits at the gate;
/// while failing, every write returns an error without touching the index.
pub struct ControlledSink {
    index: Arc<MemoryIndex>,
    open: watch::Sender<bool>,
    started: watch::Sender<usize>,
    failing: AtomicBool,
}

impl Default for ControlledSink {
    fn default() -> Self {
        Self::new(Arc::new(MemoryIndex::new()))
    }
}

impl ControlledSink {
    pub fn new(index: Arc<MemoryIndex>) -> Self {
        Self {
            index,
            open: watch::Sender::new(true),
            started: watch::Sender::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<MemoryIndex> {
        &self.index
    }

    pub fn pause(&self) {
        self.open.send_replace(false);
    }

    pub fn resume(&self) {
        self.open.send_replace(true);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of writes that reached the sink, including ones still waiting
    /// at the gate.
    pub fn writes_started(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `n` writes reached the sink.
    pub async fn wait_for_writes(&self, n: usize) {
        let mut rx = self.started.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    async fn enter(&self) -> Result<()> {
        self.started.send_modify(|n| *n += 1);
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
        if self.failing.load(Ordering::SeqCst) {
            bail!("index unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl IndexSink for ControlledSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.index.index_exists(index).await
    }

    async fn add_full_data(
        &self,
        index: &str,
        primary_key: &str,
        documents: Vec<Document>,
    ) -> Result<()> {
        self.enter().await?;
        self.index.add_full_data(index, primary_key, documents).await
    }

    async fn handle_event(&self, event: &DataEvent, target: &SyncTarget) -> Result<()> {
        self.enter().await?;
        self.index.handle_event(event, target).await
    }

    async fn handle_events(&self, target: &SyncTarget, events: &[DataEvent]) -> Result<()> {
        self.enter().await?;
        self.index.handle_events(target, events).await
    }
}

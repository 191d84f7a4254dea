//! Test doubles for runners and schedulers.
//!
//! None of these talk to an external service:
//!
//! - [`ScriptedFactory`] hands out connectors reading from in-process
//!   [`ScriptedLog`]s that tests append to while a runner is running
//! - [`ControlledSink`] wraps a `MemoryIndex` with a pause gate and failure
//!   injection
//! - [`FlakyProgressStore`] / [`FlakySyncLog`] fail a given number of writes
//! - [`TestBed`] wires all of them into [`RunnerDeps`]

pub mod sink;
pub mod source;
pub mod stores;

pub use sink::ControlledSink;
pub use source::{ScriptedFactory, ScriptedLog};
pub use stores::{FlakyProgressStore, FlakySyncLog};

use checkpoint::{MemoryStore, ProgressMarker};
use index_sink::MemoryIndex;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Catalog, Source, SourceId};

use crate::catalog::CatalogStore;
use crate::runner::{RunnerDeps, RunnerOptions};

/// A full set of in-process collaborators around one catalog.
pub struct TestBed {
    pub catalog: Arc<CatalogStore>,
    pub factory: Arc<ScriptedFactory>,
    pub progress: Arc<FlakyProgressStore>,
    pub sink: Arc<ControlledSink>,
    pub sync_logs: Arc<FlakySyncLog>,
    pub options: RunnerOptions,
}

impl TestBed {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(CatalogStore::new(catalog)),
            factory: Arc::new(ScriptedFactory::new()),
            progress: Arc::new(FlakyProgressStore::new(Arc::new(MemoryStore::new()))),
            sink: Arc::new(ControlledSink::default()),
            sync_logs: Arc::new(FlakySyncLog::new()),
            options: RunnerOptions::default(),
        }
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(Self::new(Catalog::from_yaml(yaml)?))
    }

    pub fn deps(&self) -> RunnerDeps {
        RunnerDeps {
            config: self.catalog.clone(),
            connectors: self.factory.clone(),
            progress: self.progress.clone(),
            sink: self.sink.clone(),
            sync_logs: self.sync_logs.clone(),
            options: self.options.clone(),
        }
    }

    pub fn index(&self) -> &Arc<MemoryIndex> {
        self.sink.index()
    }

    pub fn log(&self, source: SourceId) -> Arc<ScriptedLog> {
        self.factory.log(source)
    }

    pub async fn source(&self, id: SourceId) -> anyhow::Result<Source> {
        self.catalog
            .snapshot()
            .await
            .source(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Source {id} is not in the catalog"))
    }

    /// Every checkpoint write and reset of `source`, oldest first.
    pub fn progress_history(&self, source: SourceId) -> Vec<Option<ProgressMarker>> {
        self.progress.inner().history(&source.progress_key())
    }
}

/// Poll `condition` every 10ms until it holds, or fail after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("Condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

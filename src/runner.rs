//! Per-source runner.
//!
//! A runner owns one source's replication: the optional full-data bootstrap,
//! then four kinds of concurrent loops sharing one lock-guarded state block:
//!
//! - ingestion: connector → bounded queue
//! - dispatch: queue → per-target batches or direct index writes
//! - flush timer: one per target with `insert_interval`
//! - statistics: counters → sync logs every `stats_interval`
//!
//! Starting a runner is split in two phases. [`Runner::prepare`] bootstraps
//! and returns a [`RunnerHandle`]; [`RunnerHandle::run`] drives the loops
//! until one fails or the future is dropped. The loops are polled inside the
//! `run` future itself, so once it is dropped none of them can write again.

mod bootstrap;
mod loops;
mod state;

use anyhow::{bail, Context, Result};
use checkpoint::{ProgressMarker, ProgressStore};
use futures::future::try_join_all;
use futures::FutureExt;
use index_sink::IndexSink;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{ChangeStream, ConnectorFactory, Source};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::catalog::ConfigStore;
use crate::sync_log::SyncLogStore;
use loops::LoopContext;
use state::RunnerState;

pub use loops::CHECKPOINT_ATTEMPTS;

/// Default interval between two statistics flushes.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
/// Default capacity of the ingestion → dispatch queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Tunables shared by every runner.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub stats_interval: Duration,
    pub queue_capacity: usize,
    /// Log every change event at debug level.
    pub log_events: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            stats_interval: DEFAULT_STATS_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_events: false,
        }
    }
}

/// The collaborators a runner talks to.
#[derive(Clone)]
pub struct RunnerDeps {
    pub config: Arc<dyn ConfigStore>,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub progress: Arc<dyn ProgressStore>,
    pub sink: Arc<dyn IndexSink>,
    pub sync_logs: Arc<dyn SyncLogStore>,
    pub options: RunnerOptions,
}

pub struct Runner;

impl Runner {
    /// Bootstrap a source: optionally reset its progress, load its targets,
    /// connect, and load the full dataset of `full_sync` targets whose index
    /// does not exist yet.
    pub async fn prepare(
        source: Source,
        reset_progress: bool,
        deps: RunnerDeps,
    ) -> Result<RunnerHandle> {
        let key = source.progress_key();
        if reset_progress {
            deps.progress
                .reset(&key)
                .await
                .with_context(|| format!("Failed to reset progress of source \"{}\"", source.label))?;
            info!("Progress of source \"{}\" reset", source.label);
        }

        let progress = deps
            .progress
            .get(&key)
            .await
            .with_context(|| format!("Failed to load progress of source \"{}\"", source.label))?;

        let targets = deps
            .config
            .enabled_targets(source.id)
            .await
            .with_context(|| format!("Failed to load sync targets of source \"{}\"", source.label))?;

        let state = RunnerState::new(targets, progress.clone());
        let tables = state.tables();

        let connector = deps
            .connectors
            .connect(&source, progress.clone(), tables.clone())
            .await
            .with_context(|| format!("Failed to connect source \"{}\"", source.label))?;

        let snapshot: Vec<_> = state.targets.iter().map(|t| t.target.clone()).collect();
        bootstrap::full_sync(
            &source,
            &snapshot,
            connector.as_ref(),
            deps.sink.as_ref(),
        )
        .await?;

        let stream = connector
            .changes()
            .await
            .with_context(|| format!("Failed to open change stream of source \"{}\"", source.label))?;

        Ok(RunnerHandle {
            source,
            deps,
            state,
            stream,
            progress,
            tables,
        })
    }
}

/// A bootstrapped source, ready to run.
pub struct RunnerHandle {
    source: Source,
    deps: RunnerDeps,
    state: RunnerState,
    stream: Box<dyn ChangeStream>,
    progress: Option<ProgressMarker>,
    tables: Vec<String>,
}

impl RunnerHandle {
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Marker the change stream resumes from.
    pub fn progress(&self) -> Option<&ProgressMarker> {
        self.progress.as_ref()
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Run all loops until one fails.
    ///
    /// A connector that ends only stops ingestion: dispatch drains the queue
    /// and timers keep flushing until the future is dropped.
    pub async fn run(self) -> Result<()> {
        let RunnerHandle {
            source,
            deps,
            state,
            stream,
            tables,
            ..
        } = self;

        info!(
            "Start increment sync data from \"{}\" to index, tables: {}...",
            source.label,
            tables.join(", ")
        );

        let timers: Vec<(usize, Duration)> = state
            .targets
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| t.target.batching.interval().map(|i| (idx, i)))
            .collect();

        let state = Arc::new(Mutex::new(state));
        let ctx = Arc::new(LoopContext {
            source_id: source.id,
            label: source.label.clone(),
            progress_key: source.progress_key(),
            sink: deps.sink.clone(),
            progress: deps.progress.clone(),
            sync_logs: deps.sync_logs.clone(),
        });
        let (tx, rx) = mpsc::channel(deps.options.queue_capacity.max(1));

        let timers = try_join_all(
            timers
                .into_iter()
                .map(|(idx, interval)| loops::flush_timer(idx, interval, state.clone(), ctx.clone())),
        );
        let running = async {
            tokio::try_join!(
                loops::ingest(stream, tx, source.label.clone(), deps.options.log_events),
                loops::dispatch(rx, state.clone(), ctx.clone()),
                loops::save_stats(deps.options.stats_interval, state.clone(), ctx.clone()),
                timers,
            )
            .map(|_| ())
        };

        // the loops live in this future: cancelling it stops all of them
        match AssertUnwindSafe(running).catch_unwind().await {
            Ok(result) => result,
            Err(_) => bail!("A loop of source \"{}\" panicked", source.label),
        }
    }
}

//! The concurrent loops of a running source.

use anyhow::{Context, Result};
use chrono::Utc;
use checkpoint::ProgressStore;
use index_sink::IndexSink;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{ChangeEvent, ChangeStream, SourceId};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};

use super::state::{RunnerState, TargetState};
use crate::sync_log::SyncLogStore;

/// Attempts at persisting one checkpoint before giving up.
pub const CHECKPOINT_ATTEMPTS: u32 = 3;
/// Delay before a checkpoint retry, multiplied by the attempt number.
const CHECKPOINT_RETRY_DELAY_MS: u64 = 200;

/// Collaborators and identity shared by all loops of one runner.
pub(crate) struct LoopContext {
    pub source_id: SourceId,
    pub label: String,
    pub progress_key: String,
    pub sink: Arc<dyn IndexSink>,
    pub progress: Arc<dyn ProgressStore>,
    pub sync_logs: Arc<dyn SyncLogStore>,
}

impl LoopContext {
    /// Persist the safe marker if it moved.
    pub async fn checkpoint(&self, state: &mut RunnerState) -> Result<()> {
        let Some(marker) = state.checkpoint_due() else {
            return Ok(());
        };

        let mut attempt = 1;
        loop {
            match self.progress.set(&self.progress_key, &marker).await {
                Ok(()) => {
                    trace!("Checkpoint of source \"{}\" at {marker}", self.label);
                    state.mark_persisted(marker);
                    return Ok(());
                }
                Err(e) if attempt < CHECKPOINT_ATTEMPTS => {
                    warn!(
                        "Failed to save progress of source \"{}\" (attempt {attempt}/{CHECKPOINT_ATTEMPTS}): {e:#}",
                        self.label
                    );
                    tokio::time::sleep(Duration::from_millis(
                        CHECKPOINT_RETRY_DELAY_MS * attempt as u64,
                    ))
                    .await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Failed to save progress of source \"{}\"",
                        self.label
                    )))
                }
            }
        }
    }
}

/// Apply a target's buffered events. The batch is kept if the index fails.
pub(crate) async fn flush(entry: &mut TargetState, sink: &dyn IndexSink) -> Result<()> {
    if entry.batch.is_empty() {
        return Ok(());
    }
    sink.handle_events(&entry.target, entry.batch.events())
        .await
        .with_context(|| {
            format!(
                "Failed to apply {} buffered events to index \"{}\"",
                entry.batch.len(),
                entry.target.index
            )
        })?;
    entry.flushed();
    Ok(())
}

/// Move events from the connector onto the queue, in order.
pub(crate) async fn ingest(
    mut stream: Box<dyn ChangeStream>,
    queue: mpsc::Sender<ChangeEvent>,
    label: String,
    log_events: bool,
) -> Result<()> {
    while let Some(event) = stream.next().await {
        let event = event.with_context(|| format!("Change stream of source \"{label}\" failed"))?;
        if log_events {
            debug!("{event:?}");
        }
        if queue.send(event).await.is_err() {
            // dispatch is gone, the runner is shutting down
            return Ok(());
        }
    }
    info!("Change stream of source \"{label}\" ended");
    Ok(())
}

/// Pop events one at a time and route them to their targets.
pub(crate) async fn dispatch(
    mut queue: mpsc::Receiver<ChangeEvent>,
    state: Arc<Mutex<RunnerState>>,
    ctx: Arc<LoopContext>,
) -> Result<()> {
    while let Some(event) = queue.recv().await {
        let mut guard = state.lock().await;
        dispatch_event(event, &mut guard, &ctx).await?;
    }
    debug!("Queue of source \"{}\" drained", ctx.label);
    Ok(())
}

async fn dispatch_event(
    event: ChangeEvent,
    state: &mut RunnerState,
    ctx: &LoopContext,
) -> Result<()> {
    let (seq, previous) = state.advance(event.progress().clone());

    let event = match event {
        ChangeEvent::Progress(_) => return ctx.checkpoint(state).await,
        ChangeEvent::Data(event) => event,
    };

    let targets = state.targets_for(&event.table);
    if targets.is_empty() {
        trace!("Dropping {} on unsynced table '{}'", event.kind, event.table);
        return Ok(());
    }

    let mut applied = false;
    for idx in targets {
        let entry = &mut state.targets[idx];
        state.stats.record(entry.target.id, event.kind);

        if !entry.target.batching.is_batched() {
            ctx.sink
                .handle_event(&event, &entry.target)
                .await
                .with_context(|| {
                    format!(
                        "Failed to apply {} on '{}' to index \"{}\"",
                        event.kind, event.table, entry.target.index
                    )
                })?;
            applied = true;
            continue;
        }

        entry.buffer(event.clone(), seq, previous.clone());
        if entry.target.batching.size_reached(entry.batch.len()) {
            flush(entry, ctx.sink.as_ref()).await?;
            applied = true;
        }
    }

    if applied {
        ctx.checkpoint(state).await?;
    }
    Ok(())
}

/// Flush one batched target every `interval`, whatever its size.
pub(crate) async fn flush_timer(
    idx: usize,
    interval: Duration,
    state: Arc<Mutex<RunnerState>>,
    ctx: Arc<LoopContext>,
) -> Result<()> {
    loop {
        tokio::time::sleep(interval).await;

        let mut guard = state.lock().await;
        let entry = &mut guard.targets[idx];
        let index = entry.target.index.clone();
        let result = match flush(entry, ctx.sink.as_ref()).await {
            Ok(()) => ctx.checkpoint(&mut guard).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Error when flushing batch to index \"{index}\": {e:#}");
        }
    }
}

/// Turn accumulated counters into sync logs every `interval`.
pub(crate) async fn save_stats(
    interval: Duration,
    state: Arc<Mutex<RunnerState>>,
    ctx: Arc<LoopContext>,
) -> Result<()> {
    loop {
        tokio::time::sleep(interval).await;

        let mut guard = state.lock().await;
        if guard.stats.is_empty() {
            continue;
        }

        let logs = guard.stats.to_logs(ctx.source_id, Utc::now());
        if let Err(e) = ctx.sync_logs.append(logs).await {
            error!(
                "Failed to save sync logs of source \"{}\": {e:#}",
                ctx.label
            );
            continue;
        }

        for (sync, kinds) in guard.stats.iter() {
            let total: u64 = kinds.values().sum();
            let table = guard
                .targets
                .iter()
                .find(|t| t.target.id == sync)
                .map(|t| t.target.table.as_str())
                .unwrap_or_default();
            let summary = kinds
                .iter()
                .map(|(kind, count)| format!("{kind}: {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            info!(
                "Save {total} sync logs for table \"{}.{table}\", {summary}",
                ctx.label
            );
        }
        guard.stats.clear();
    }
}

//! Lifecycle of all source runners.

use anyhow::Result;
use std::collections::HashMap;
use sync_core::{Source, SourceId};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::catalog::CatalogDiff;
use crate::runner::{Runner, RunnerDeps};

/// Observable state of a tracked source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Bootstrapping,
    Running,
    /// The runner returned without error. Only happens when it has no loop
    /// left to run.
    Stopped,
    /// The runner failed with this error; the source stays tracked until it
    /// is removed or restarted.
    Failed(String),
}

struct SourceTask {
    label: String,
    handle: JoinHandle<()>,
    state: watch::Receiver<SourceState>,
}

/// Owns one runner task per source.
pub struct Scheduler {
    deps: RunnerDeps,
    tasks: Mutex<HashMap<SourceId, SourceTask>>,
}

impl Scheduler {
    pub fn new(deps: RunnerDeps) -> Self {
        Self {
            deps,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a runner for every enabled source of the configuration store.
    pub async fn startup(&self) -> Result<()> {
        let sources = self.deps.config.sources().await?;
        let mut started = 0;
        for source in sources {
            if self.add_source(source).await {
                started += 1;
            }
        }
        info!("Scheduler started {started} source(s)");
        Ok(())
    }

    /// Cancel every runner.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, task) in tasks.drain() {
            stop(task).await;
        }
        info!("Scheduler stopped");
    }

    /// Start a runner for `source` unless it is disabled or already tracked.
    /// Returns whether a runner was started.
    pub async fn add_source(&self, source: Source) -> bool {
        if !source.enabled {
            return false;
        }
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&source.id) {
            return false;
        }
        tasks.insert(source.id, self.spawn(source, false));
        true
    }

    /// Cancel and untrack a source's runner. Returns whether it was tracked.
    pub async fn remove_source(&self, id: SourceId) -> bool {
        let task = self.tasks.lock().await.remove(&id);
        match task {
            Some(task) => {
                info!("Remove source \"{}\"", task.label);
                stop(task).await;
                true
            }
            None => false,
        }
    }

    /// Replace a source's runner with a fresh one. With `reset_progress` the
    /// new runner starts from an empty progress marker.
    pub async fn restart_source(&self, source: Source, reset_progress: bool) {
        info!("Restart source \"{}\"...", source.label);
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.remove(&source.id) {
            stop(task).await;
        }
        if source.enabled {
            tasks.insert(source.id, self.spawn(source, reset_progress));
        }
    }

    /// Bring the tracked runners in line with a catalog change.
    pub async fn apply(&self, diff: CatalogDiff) {
        for id in diff.removed {
            self.remove_source(id).await;
        }
        for source in diff.added {
            self.add_source(source).await;
        }
        for source in diff.changed {
            self.restart_source(source, false).await;
        }
    }

    pub async fn status(&self, id: SourceId) -> Option<SourceState> {
        let tasks = self.tasks.lock().await;
        tasks.get(&id).map(|task| task.state.borrow().clone())
    }

    /// States of all tracked sources, by source id.
    pub async fn statuses(&self) -> Vec<(SourceId, SourceState)> {
        let tasks = self.tasks.lock().await;
        let mut statuses: Vec<_> = tasks
            .iter()
            .map(|(id, task)| (*id, task.state.borrow().clone()))
            .collect();
        statuses.sort_by_key(|(id, _)| *id);
        statuses
    }

    /// Ids of all tracked sources, sorted.
    pub async fn running_sources(&self) -> Vec<SourceId> {
        let tasks = self.tasks.lock().await;
        let mut ids: Vec<_> = tasks.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Subscribe to state changes of a tracked source.
    pub async fn watch(&self, id: SourceId) -> Option<watch::Receiver<SourceState>> {
        let tasks = self.tasks.lock().await;
        tasks.get(&id).map(|task| task.state.clone())
    }

    fn spawn(&self, source: Source, reset_progress: bool) -> SourceTask {
        let (tx, rx) = watch::channel(SourceState::Bootstrapping);
        let deps = self.deps.clone();
        let label = source.label.clone();

        let handle = tokio::spawn({
            let label = label.clone();
            async move {
                let result: Result<()> = async {
                    let runner = Runner::prepare(source, reset_progress, deps).await?;
                    tx.send_replace(SourceState::Running);
                    runner.run().await
                }
                .await;

                match result {
                    Ok(()) => {
                        info!("Source \"{label}\" stopped");
                        tx.send_replace(SourceState::Stopped);
                    }
                    Err(e) => {
                        error!("Source \"{label}\" failed: {e:#}");
                        tx.send_replace(SourceState::Failed(format!("{e:#}")));
                    }
                }
            }
        });

        SourceTask {
            label,
            handle,
            state: rx,
        }
    }
}

/// Abort a runner task and wait until it is gone.
async fn stop(task: SourceTask) {
    task.handle.abort();
    // cancelled is the expected outcome; a panic was already reported
    let _ = task.handle.await;
}

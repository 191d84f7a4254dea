//! index-sync Library
//!
//! Keeps search indexes in sync with changing data sources.
//!
//! # Features
//!
//! - Many sources replicated concurrently, one runner per source
//! - Fan-out: one source table can feed several indexes
//! - Per-target batching by size and/or time
//! - Resumable progress: a restarted source continues from its last checkpoint
//! - Optional full-data bootstrap for targets whose index does not exist yet
//! - Runtime reconfiguration: add, remove or restart a source without
//!   restarting the process
//!
//! # Architecture
//!
//! - [`scheduler::Scheduler`] owns one task per enabled source
//! - [`runner::Runner`] bootstraps a source and runs its ingestion, dispatch,
//!   flush-timer and statistics loops
//! - [`catalog::CatalogStore`] serves sources and sync targets from a YAML
//!   catalog
//! - [`connectors::ConnectorRegistry`] builds connectors by source type
//! - [`sync_log::SyncLogStore`] receives the periodic statistics
//!
//! # CLI Usage
//!
//! ```bash
//! # Run every enabled source of a catalog against Meilisearch
//! index-sync serve --catalog catalog.yaml --meili-url http://localhost:7700
//!
//! # Validate a catalog
//! index-sync check --catalog catalog.yaml
//!
//! # Force a source to start over on next start
//! index-sync progress reset --source 1
//! ```

use clap::Parser;
use index_sink::{DryRunSink, IndexSink};
use meilisearch_sink::{MeiliConfig, MeilisearchSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod catalog;
pub mod connectors;
pub mod runner;
pub mod scheduler;
pub mod sync_log;
pub mod testing;

pub use catalog::{CatalogDiff, CatalogStore, ConfigStore};
pub use connectors::ConnectorRegistry;
pub use runner::{Runner, RunnerDeps, RunnerHandle, RunnerOptions};
pub use scheduler::{Scheduler, SourceState};
pub use sync_log::{JsonlSyncLog, MemorySyncLog, SyncLogStore};

// Re-export the JSONL connector for convenience
pub use index_sync_jsonl_source as jsonl;

#[derive(Parser, Clone, Debug)]
pub struct MeiliOpts {
    /// Meilisearch URL
    #[arg(long, default_value = "http://localhost:7700", env = "MEILI_URL")]
    pub meili_url: String,

    /// Meilisearch API key
    #[arg(long, env = "MEILI_API_KEY")]
    pub meili_api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    pub meili_timeout: u64,

    /// Dry run mode - don't actually write data
    #[arg(long)]
    pub dry_run: bool,
}

impl MeiliOpts {
    /// The index sink these options describe.
    pub fn sink(&self) -> anyhow::Result<Arc<dyn IndexSink>> {
        if self.dry_run {
            return Ok(Arc::new(DryRunSink));
        }
        let sink = MeilisearchSink::new(MeiliConfig {
            api_url: self.meili_url.clone(),
            api_key: self.meili_api_key.clone(),
            timeout: Duration::from_secs(self.meili_timeout),
        })?;
        Ok(Arc::new(sink))
    }
}

#[derive(Parser, Clone, Debug)]
pub struct RunnerOpts {
    /// Directory holding one progress file per source
    #[arg(
        long,
        default_value = ".index-sync/progress",
        env = "INDEX_SYNC_PROGRESS_DIR"
    )]
    pub progress_dir: PathBuf,

    /// File the periodic sync statistics are appended to
    #[arg(
        long,
        default_value = ".index-sync/sync_logs.jsonl",
        env = "INDEX_SYNC_LOG_FILE"
    )]
    pub sync_log: PathBuf,

    /// Seconds between two statistics flushes
    #[arg(long, default_value = "60")]
    pub stats_interval: u64,

    /// Events buffered between a source's connector and its dispatcher
    #[arg(long, default_value = "1024")]
    pub queue_capacity: usize,

    /// Log every change event
    #[arg(long, env = "INDEX_SYNC_DEBUG")]
    pub debug: bool,
}

impl RunnerOpts {
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            stats_interval: Duration::from_secs(self.stats_interval.max(1)),
            queue_capacity: self.queue_capacity.max(1),
            log_events: self.debug,
        }
    }
}

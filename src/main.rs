//! Command-line interface for index-sync
//!
//! # Usage Examples
//!
//! ## Serve
//! ```bash
//! # Replicate every enabled source of the catalog into Meilisearch
//! index-sync serve --catalog catalog.yaml \
//!   --meili-url http://localhost:7700 --meili-api-key masterKey
//!
//! # Same, logging writes instead of performing them
//! index-sync serve --catalog catalog.yaml --dry-run
//! ```
//!
//! Send SIGHUP to reload the catalog: removed or disabled sources are
//! stopped, new ones started, changed ones restarted from their checkpoint.
//!
//! ## Progress
//! ```bash
//! index-sync progress show --source 1
//! index-sync progress set --source 1 --marker '{"offset": 1024}'
//! index-sync progress reset --source 1
//! ```
//!
//! ## Catalog Format
//! ```yaml
//! sources:
//!   - id: 1
//!     label: main
//!     type: jsonl
//!     connection: {path: /var/lib/app/changes.jsonl, snapshot_dir: /var/lib/app/snapshots}
//! syncs:
//!   - id: 10
//!     source: 1
//!     table: users
//!     index: users
//!     full_sync: true
//!     insert_size: 1000
//!     insert_interval: 10
//! ```

use anyhow::Context;
use checkpoint::{FilesystemStore, ProgressMarker, ProgressStore};
use clap::{Parser, Subcommand};
use index_sync::{
    CatalogStore, ConnectorRegistry, JsonlSyncLog, MeiliOpts, RunnerDeps, RunnerOpts, Scheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use sync_core::{Catalog, SourceId};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "index-sync")]
#[command(about = "Keep search indexes in sync with changing data sources")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled source until interrupted
    Serve {
        /// Catalog of sources and sync targets
        #[arg(long, env = "INDEX_SYNC_CATALOG")]
        catalog: PathBuf,

        /// Target index options
        #[command(flatten)]
        meili: MeiliOpts,

        /// Runner options
        #[command(flatten)]
        runner: RunnerOpts,
    },

    /// Validate a catalog and print what it would run
    Check {
        #[arg(long, env = "INDEX_SYNC_CATALOG")]
        catalog: PathBuf,
    },

    /// Inspect or change stored progress markers
    Progress {
        #[command(subcommand)]
        command: ProgressCommand,
    },
}

#[derive(Subcommand)]
enum ProgressCommand {
    /// Print the stored marker of a source
    Show {
        #[arg(long)]
        source: u64,

        #[arg(
            long,
            default_value = ".index-sync/progress",
            env = "INDEX_SYNC_PROGRESS_DIR"
        )]
        progress_dir: PathBuf,
    },

    /// Overwrite the stored marker of a source
    Set {
        #[arg(long)]
        source: u64,

        /// Marker as JSON, e.g. '{"offset": 1024}'
        #[arg(long)]
        marker: String,

        #[arg(
            long,
            default_value = ".index-sync/progress",
            env = "INDEX_SYNC_PROGRESS_DIR"
        )]
        progress_dir: PathBuf,
    },

    /// Forget the stored marker of a source; it starts over on next start
    Reset {
        #[arg(long)]
        source: u64,

        #[arg(
            long,
            default_value = ".index-sync/progress",
            env = "INDEX_SYNC_PROGRESS_DIR"
        )]
        progress_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if matches!(&cli.command, Commands::Serve { runner, .. } if runner.debug) {
        filter = filter.add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into());
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            catalog,
            meili,
            runner,
        } => serve(catalog, meili, runner).await,
        Commands::Check { catalog } => check(catalog),
        Commands::Progress { command } => run_progress(command).await,
    }
}

async fn serve(catalog: PathBuf, meili: MeiliOpts, runner: RunnerOpts) -> anyhow::Result<()> {
    let store = Arc::new(CatalogStore::from_file(&catalog)?);
    info!("Loaded catalog from {}", catalog.display());
    if meili.dry_run {
        info!("Running in dry-run mode - no data will be written");
    }

    let deps = RunnerDeps {
        config: store.clone(),
        connectors: Arc::new(ConnectorRegistry::with_defaults()),
        progress: Arc::new(FilesystemStore::new(&runner.progress_dir)),
        sink: meili.sink()?,
        sync_logs: Arc::new(JsonlSyncLog::new(&runner.sync_log)),
        options: runner.runner_options(),
    };

    let scheduler = Scheduler::new(deps);
    scheduler.startup().await?;

    let result = wait_for_shutdown(&scheduler, &store).await;
    scheduler.shutdown().await;
    result
}

#[cfg(unix)]
async fn wait_for_shutdown(scheduler: &Scheduler, store: &CatalogStore) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received interrupt signal (Ctrl+C)");
                return Ok(());
            }
            _ = hangup.recv() => reload(scheduler, store).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_scheduler: &Scheduler, _store: &CatalogStore) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received interrupt signal (Ctrl+C)");
    Ok(())
}

#[cfg(unix)]
async fn reload(scheduler: &Scheduler, store: &CatalogStore) {
    match store.reload().await {
        Ok(diff) if diff.is_empty() => info!("Catalog reloaded, nothing changed"),
        Ok(diff) => {
            info!(
                "Catalog reloaded: {} removed, {} added, {} changed source(s)",
                diff.removed.len(),
                diff.added.len(),
                diff.changed.len()
            );
            scheduler.apply(diff).await;
        }
        Err(e) => error!("Keeping current catalog: {e:#}"),
    }
}

fn check(path: PathBuf) -> anyhow::Result<()> {
    let catalog = Catalog::from_file(&path)
        .with_context(|| format!("Failed to load catalog from {}", path.display()))?;
    let registry = ConnectorRegistry::with_defaults();

    for source in &catalog.sources {
        if !registry.supports(&source.source_type) {
            anyhow::bail!(
                "Source {} \"{}\" has unsupported type '{}' (supported: {})",
                source.id,
                source.label,
                source.source_type,
                registry.source_types().join(", ")
            );
        }

        let state = if source.enabled { "enabled" } else { "disabled" };
        println!(
            "Source {} \"{}\" ({}, {state})",
            source.id, source.label, source.source_type
        );
        for target in catalog.targets(source.id) {
            let batching = match (target.batching.insert_size, target.batching.insert_interval) {
                (None, None) => "unbatched".to_string(),
                (size, interval) => format!(
                    "insert_size={}, insert_interval={}",
                    size.map_or("-".to_string(), |s| s.to_string()),
                    interval.map_or("-".to_string(), |i| format!("{i}s"))
                ),
            };
            println!(
                "  sync {}: {} -> {} [{batching}]{}{}",
                target.id,
                target.table,
                target.index,
                if target.full_sync { " full_sync" } else { "" },
                if target.enabled { "" } else { " (disabled)" }
            );
        }
    }

    println!(
        "Catalog OK: {} source(s), {} sync target(s)",
        catalog.sources.len(),
        catalog.syncs.len()
    );
    Ok(())
}

async fn run_progress(command: ProgressCommand) -> anyhow::Result<()> {
    match command {
        ProgressCommand::Show {
            source,
            progress_dir,
        } => {
            let store = FilesystemStore::new(progress_dir);
            match store.get(&SourceId(source).progress_key()).await? {
                Some(marker) => println!("{}", marker.to_cli_string()),
                None => println!("No progress stored for source {source}"),
            }
        }
        ProgressCommand::Set {
            source,
            marker,
            progress_dir,
        } => {
            let marker = ProgressMarker::from_cli_string(&marker)?;
            let store = FilesystemStore::new(progress_dir);
            store.set(&SourceId(source).progress_key(), &marker).await?;
            info!("Progress of source {source} set to {marker}");
        }
        ProgressCommand::Reset {
            source,
            progress_dir,
        } => {
            let store = FilesystemStore::new(progress_dir);
            store.reset(&SourceId(source).progress_key()).await?;
            info!("Progress of source {source} reset");
        }
    }
    Ok(())
}

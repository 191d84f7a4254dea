//! Durable statistics records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use sync_core::SyncLog;
use tokio::io::AsyncWriteExt;

/// Destination of the runner's periodic statistics.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    async fn append(&self, logs: Vec<SyncLog>) -> Result<()>;
}

/// Appends records to a file, one JSON object per line.
pub struct JsonlSyncLog {
    path: PathBuf,
}

impl JsonlSyncLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl SyncLogStore for JsonlSyncLog {
    async fn append(&self, logs: Vec<SyncLog>) -> Result<()> {
        let mut buf = Vec::new();
        for log in &logs {
            serde_json::to_writer(&mut buf, log)?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open sync log {}", self.path.display()))?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemorySyncLog {
    logs: Mutex<Vec<SyncLog>>,
}

impl MemorySyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<SyncLog> {
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SyncLogStore for MemorySyncLog {
    async fn append(&self, logs: Vec<SyncLog>) -> Result<()> {
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(logs);
        Ok(())
    }
}

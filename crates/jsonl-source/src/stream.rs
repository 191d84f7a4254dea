//! Tailing reader over the change log.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::{ChangeEvent, ChangeStream, DataEvent, Document, EventKind};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

use crate::{marker_at, JsonlConfig};

/// Kind field of a change-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Create,
    Update,
    Delete,
    Progress,
}

/// One line of the change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub data: Document,
}

impl JsonlRecord {
    pub fn change(table: &str, kind: EventKind, data: Document) -> Self {
        let kind = match kind {
            EventKind::Create => RecordKind::Create,
            EventKind::Update => RecordKind::Update,
            EventKind::Delete => RecordKind::Delete,
        };
        Self {
            table: Some(table.to_string()),
            kind,
            data,
        }
    }

    pub fn progress() -> Self {
        Self {
            table: None,
            kind: RecordKind::Progress,
            data: Document::new(),
        }
    }
}

/// [`ChangeStream`] reading a JSONL change log from a byte offset.
///
/// Lines for tables outside the requested set come out as progress-only
/// events, so the runner can checkpoint past them.
pub struct JsonlChangeStream {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    pending: String,
    tables: HashSet<String>,
    poll_interval: Duration,
    follow: bool,
}

impl JsonlChangeStream {
    /// Open the log and position it at `offset`. An empty `tables` set means
    /// every table.
    pub async fn open(config: JsonlConfig, offset: u64, tables: HashSet<String>) -> Result<Self> {
        let mut file = File::open(&config.path)
            .await
            .with_context(|| format!("Failed to open change log {}", config.path.display()))?;

        let len = file.metadata().await?.len();
        if len < offset {
            bail!(
                "Change log {} is {len} bytes, shorter than stored offset {offset}; reset the source's progress",
                config.path.display()
            );
        }
        file.seek(SeekFrom::Start(offset)).await?;

        info!(
            "Reading changes from {} at offset {offset}",
            config.path.display()
        );

        Ok(Self {
            path: config.path.clone(),
            reader: BufReader::new(file),
            offset,
            pending: String::new(),
            tables,
            poll_interval: config.poll_interval(),
            follow: config.follow,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next complete line, or None at end of file.
    ///
    /// A line still being written (no trailing newline yet) stays buffered
    /// and does not advance the offset.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let n = self
            .reader
            .read_line(&mut self.pending)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let complete = self.pending.ends_with('\n') || (n == 0 && !self.follow);
        if self.pending.is_empty() || !complete {
            return Ok(None);
        }

        let line = std::mem::take(&mut self.pending);
        self.offset += line.len() as u64;
        Ok(Some(line))
    }

    fn parse(&self, line: &str) -> Result<ChangeEvent> {
        let record: JsonlRecord = serde_json::from_str(line).with_context(|| {
            format!(
                "Invalid change record in {} before offset {}",
                self.path.display(),
                self.offset
            )
        })?;
        let progress = marker_at(self.offset);

        let kind = match record.kind {
            RecordKind::Create => EventKind::Create,
            RecordKind::Update => EventKind::Update,
            RecordKind::Delete => EventKind::Delete,
            RecordKind::Progress => return Ok(ChangeEvent::Progress(progress)),
        };
        let Some(table) = record.table else {
            bail!(
                "{kind} record without table in {} before offset {}",
                self.path.display(),
                self.offset
            );
        };
        if !self.tables.is_empty() && !self.tables.contains(&table) {
            debug!("Skipping {kind} on unsynced table '{table}'");
            return Ok(ChangeEvent::Progress(progress));
        }

        Ok(ChangeEvent::Data(DataEvent {
            table,
            kind,
            data: record.data,
            progress,
        }))
    }
}

#[async_trait]
impl ChangeStream for JsonlChangeStream {
    async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        loop {
            match self.read_line().await {
                Err(e) => return Some(Err(e)),
                Ok(None) if self.follow => tokio::time::sleep(self.poll_interval).await,
                Ok(None) => return None,
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(self.parse(&line)),
            }
        }
    }
}

//! JSONL change-log connector for index-sync
//!
//! Reads changes from an append-only file of JSON lines:
//!
//! ```text
//! {"table": "users", "kind": "create", "data": {"id": 1, "name": "Ada"}}
//! {"table": "users", "kind": "delete", "data": {"id": 1}}
//! {"kind": "progress"}
//! ```
//!
//! The progress marker is `{"offset": <byte offset after the line>}`. Full
//! data for a table is read from `<snapshot_dir>/<table>.jsonl`, one document
//! per line.

mod config;
mod full_data;
mod stream;

#[cfg(test)]
mod tests;

pub use config::{JsonlConfig, DEFAULT_POLL_INTERVAL_MS};
pub use stream::{JsonlChangeStream, JsonlRecord, RecordKind};

use async_trait::async_trait;
use checkpoint::ProgressMarker;
use std::collections::HashSet;
use sync_core::{ChangeStream, FullDataStream, SourceConnector};

/// Source type name this connector is registered under.
pub const SOURCE_TYPE: &str = "jsonl";

/// Connector over one JSONL change log.
pub struct JsonlSource {
    config: JsonlConfig,
    offset: u64,
    tables: HashSet<String>,
}

impl JsonlSource {
    /// Create a connector resuming after `progress`, or from the start of the
    /// log when None.
    pub fn new(
        config: JsonlConfig,
        progress: Option<&ProgressMarker>,
        tables: impl IntoIterator<Item = String>,
    ) -> anyhow::Result<Self> {
        let offset = match progress {
            Some(marker) => offset_of(marker)?,
            None => 0,
        };
        Ok(Self {
            config,
            offset,
            tables: tables.into_iter().collect(),
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Build the marker for a byte offset.
pub fn marker_at(offset: u64) -> ProgressMarker {
    ProgressMarker::new(serde_json::json!({ "offset": offset }))
}

/// Read the byte offset out of a marker produced by [`marker_at`].
pub fn offset_of(marker: &ProgressMarker) -> anyhow::Result<u64> {
    marker
        .get("offset")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Invalid JSONL progress marker: {marker}"))
}

#[async_trait]
impl SourceConnector for JsonlSource {
    fn full_data<'a>(&'a self, table: &'a str, chunk_size: usize) -> FullDataStream<'a> {
        full_data::read_snapshot(&self.config, table, chunk_size)
    }

    async fn changes(self: Box<Self>) -> anyhow::Result<Box<dyn ChangeStream>> {
        let stream = JsonlChangeStream::open(self.config, self.offset, self.tables).await?;
        Ok(Box::new(stream))
    }
}

//! Connection settings of a JSONL source.

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Delay between two reads once the end of the log is reached.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_follow() -> bool {
    true
}

/// Parsed `connection` block of a `jsonl` source.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonlConfig {
    /// Change log to read
    pub path: PathBuf,
    /// Directory holding `<table>.jsonl` snapshots for full sync
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Keep waiting for new lines at end of file. When false the stream ends
    /// at EOF, which is what one-shot imports and tests want.
    #[serde(default = "default_follow")]
    pub follow: bool,
}

impl JsonlConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot_dir: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            follow: true,
        }
    }

    /// Parse a source's opaque connection settings.
    pub fn from_connection(connection: &serde_json::Map<String, Value>) -> anyhow::Result<Self> {
        serde_json::from_value(Value::Object(connection.clone()))
            .context("Invalid jsonl connection settings")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

//! Sources and sync targets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::event::Document;

/// Chunk size for full-data extraction when a target has no `insert_interval`.
pub const DEFAULT_FULL_SYNC_CHUNK_SIZE: usize = 10_000;

/// Identity of a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SourceId {
    /// Key under which this source's progress marker is stored.
    pub fn progress_key(&self) -> String {
        format!("progress:{}", self.0)
    }
}

/// Identity of a sync target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(pub u64);

impl std::fmt::Display for SyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_true() -> bool {
    true
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// A database (or log) whose changes are replicated.
///
/// `connection` is handed verbatim to the connector registered for
/// `source_type`; the core never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub label: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub connection: serde_json::Map<String, Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Source {
    pub fn progress_key(&self) -> String {
        self.id.progress_key()
    }
}

/// Flush policy of a sync target.
///
/// Both thresholds are optional and independent. A target with neither is
/// unbatched: every event is applied to the index as soon as it is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batching {
    /// Flush once this many events are buffered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_size: Option<usize>,
    /// Flush every this many seconds, whatever the buffer holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_interval: Option<u64>,
}

impl Batching {
    pub fn unbatched() -> Self {
        Self::default()
    }

    pub fn is_batched(&self) -> bool {
        self.insert_size.is_some() || self.insert_interval.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.insert_interval.map(Duration::from_secs)
    }

    /// True once a batch of `len` events must be flushed by size.
    pub fn size_reached(&self, len: usize) -> bool {
        matches!(self.insert_size, Some(size) if len >= size)
    }

    /// Rows per chunk when streaming the initial full dataset.
    pub fn full_data_chunk_size(&self) -> usize {
        match self.insert_interval {
            Some(interval) if interval > 0 => interval as usize,
            _ => DEFAULT_FULL_SYNC_CHUNK_SIZE,
        }
    }
}

/// One table → index mapping of a source (a "sync").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub id: SyncId,
    #[serde(default)]
    pub label: String,
    pub source: SourceId,
    pub table: String,
    pub index: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Field filter and renames: only listed fields are indexed, a non-null
    /// value renames the field. `None` indexes every field as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Option<String>>>,
    #[serde(flatten)]
    pub batching: Batching,
}

impl SyncTarget {
    /// Apply the field filter to a row.
    ///
    /// The primary key always survives under its own name, otherwise the
    /// index could not address the document for later updates and deletes.
    pub fn project(&self, doc: &Document) -> Document {
        let Some(fields) = &self.fields else {
            return doc.clone();
        };

        let mut out = Document::new();
        for (name, value) in doc {
            if *name == self.primary_key {
                out.insert(name.clone(), value.clone());
            } else if let Some(rename) = fields.get(name) {
                let key = rename.clone().unwrap_or_else(|| name.clone());
                out.insert(key, value.clone());
            }
        }
        out
    }

    /// Primary key value of a row, if present.
    pub fn primary_key_of<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        doc.get(&self.primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(fields: Option<BTreeMap<String, Option<String>>>) -> SyncTarget {
        SyncTarget {
            id: SyncId(1),
            label: "users".to_string(),
            source: SourceId(1),
            table: "users".to_string(),
            index: "users".to_string(),
            primary_key: "id".to_string(),
            full_sync: false,
            enabled: true,
            fields,
            batching: Batching::unbatched(),
        }
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_project_without_fields_keeps_everything() {
        let t = target(None);
        let row = doc(json!({"id": 1, "name": "a", "secret": "x"}));
        assert_eq!(t.project(&row), row);
    }

    #[test]
    fn test_project_filters_and_renames() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), None);
        fields.insert("mail".to_string(), Some("email".to_string()));
        let t = target(Some(fields));

        let row = doc(json!({"id": 1, "name": "a", "mail": "a@b", "secret": "x"}));
        assert_eq!(
            t.project(&row),
            doc(json!({"id": 1, "name": "a", "email": "a@b"}))
        );
    }

    #[test]
    fn test_batching_thresholds() {
        let unbatched = Batching::unbatched();
        assert!(!unbatched.is_batched());
        assert!(!unbatched.size_reached(1_000_000));
        assert_eq!(unbatched.full_data_chunk_size(), DEFAULT_FULL_SYNC_CHUNK_SIZE);

        let sized = Batching {
            insert_size: Some(3),
            insert_interval: None,
        };
        assert!(sized.is_batched());
        assert!(!sized.size_reached(2));
        assert!(sized.size_reached(3));
        assert_eq!(sized.interval(), None);

        let timed = Batching {
            insert_size: None,
            insert_interval: Some(5),
        };
        assert!(timed.is_batched());
        assert!(!timed.size_reached(100));
        assert_eq!(timed.interval(), Some(Duration::from_secs(5)));
        assert_eq!(timed.full_data_chunk_size(), 5);
    }

    #[test]
    fn test_progress_key() {
        let source = Source {
            id: SourceId(42),
            label: "main".to_string(),
            source_type: "jsonl".to_string(),
            connection: Default::default(),
            enabled: true,
        };
        assert_eq!(source.progress_key(), "progress:42");
    }
}

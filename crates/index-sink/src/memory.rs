//! In-process index.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use sync_core::{DataEvent, Document, EventKind, SyncTarget};

use crate::IndexSink;

/// A call received by a [`MemoryIndex`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    FullData {
        index: String,
        documents: usize,
    },
    Event {
        index: String,
        kind: EventKind,
        key: String,
    },
    Batch {
        index: String,
        changes: Vec<(EventKind, String)>,
    },
}

/// Stable string form of a primary key value.
pub fn document_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Default)]
struct Inner {
    indexes: HashMap<String, BTreeMap<String, Document>>,
    calls: Vec<SinkCall>,
}

/// Keeps indexes as maps from primary key to document.
///
/// Indexes are created on first write, like a search engine that
/// auto-creates indexes, or explicitly with [`MemoryIndex::create_index`].
#[derive(Default)]
pub struct MemoryIndex {
    inner: Mutex<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_index(&self, index: &str) {
        self.lock().indexes.entry(index.to_string()).or_default();
    }

    /// Documents of `index` keyed by primary key, empty if it does not exist.
    pub fn documents(&self, index: &str) -> BTreeMap<String, Document> {
        self.lock().indexes.get(index).cloned().unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.lock().calls.clone()
    }

    /// Changes applied to `index` through single or batched writes, in order.
    pub fn applied(&self, index: &str) -> Vec<(EventKind, String)> {
        self.lock()
            .calls
            .iter()
            .flat_map(|call| match call {
                SinkCall::Event {
                    index: i,
                    kind,
                    key,
                } if i == index => vec![(*kind, key.clone())],
                SinkCall::Batch { index: i, changes } if i == index => changes.clone(),
                _ => vec![],
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(inner: &mut Inner, event: &DataEvent, target: &SyncTarget) -> Result<String> {
        let key = target
            .primary_key_of(&event.data)
            .map(document_key)
            .ok_or_else(|| {
                anyhow!(
                    "{} event on '{}' has no primary key field '{}'",
                    event.kind,
                    event.table,
                    target.primary_key
                )
            })?;

        let index = inner.indexes.entry(target.index.clone()).or_default();
        match event.kind {
            EventKind::Create | EventKind::Update => {
                index.insert(key.clone(), target.project(&event.data));
            }
            EventKind::Delete => {
                index.remove(&key);
            }
        }
        Ok(key)
    }
}

#[async_trait::async_trait]
impl IndexSink for MemoryIndex {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.lock().indexes.contains_key(index))
    }

    async fn add_full_data(
        &self,
        index: &str,
        primary_key: &str,
        documents: Vec<Document>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let count = documents.len();
        let target = inner.indexes.entry(index.to_string()).or_default();
        for doc in documents {
            let key = doc
                .get(primary_key)
                .map(document_key)
                .ok_or_else(|| anyhow!("Document has no primary key field '{primary_key}'"))?;
            target.insert(key, doc);
        }
        inner.calls.push(SinkCall::FullData {
            index: index.to_string(),
            documents: count,
        });
        Ok(())
    }

    async fn handle_event(&self, event: &DataEvent, target: &SyncTarget) -> Result<()> {
        let mut inner = self.lock();
        let key = Self::apply(&mut inner, event, target)?;
        inner.calls.push(SinkCall::Event {
            index: target.index.clone(),
            kind: event.kind,
            key,
        });
        Ok(())
    }

    async fn handle_events(&self, target: &SyncTarget, events: &[DataEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        let mut changes = Vec::with_capacity(events.len());
        for event in events {
            let key = Self::apply(&mut inner, event, target)?;
            changes.push((event.kind, key));
        }
        inner.calls.push(SinkCall::Batch {
            index: target.index.clone(),
            changes,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkpoint::ProgressMarker;
    use serde_json::json;
    use sync_core::{Batching, SourceId, SyncId};

    fn target() -> SyncTarget {
        SyncTarget {
            id: SyncId(1),
            label: String::new(),
            source: SourceId(1),
            table: "users".to_string(),
            index: "users".to_string(),
            primary_key: "id".to_string(),
            full_sync: false,
            enabled: true,
            fields: None,
            batching: Batching::unbatched(),
        }
    }

    fn event(kind: EventKind, data: Value) -> DataEvent {
        DataEvent {
            table: "users".to_string(),
            kind,
            data: data.as_object().cloned().unwrap(),
            progress: ProgressMarker::new(json!({})),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let index = MemoryIndex::new();
        let t = target();
        assert!(!index.index_exists("users").await.unwrap());

        index
            .handle_event(&event(EventKind::Create, json!({"id": 1, "name": "a"})), &t)
            .await
            .unwrap();
        index
            .handle_events(
                &t,
                &[
                    event(EventKind::Update, json!({"id": 1, "name": "b"})),
                    event(EventKind::Create, json!({"id": "x", "name": "c"})),
                    event(EventKind::Delete, json!({"id": "x"})),
                ],
            )
            .await
            .unwrap();

        assert!(index.index_exists("users").await.unwrap());
        let docs = index.documents("users");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs["1"]["name"], json!("b"));
        assert_eq!(
            index.applied("users"),
            vec![
                (EventKind::Create, "1".to_string()),
                (EventKind::Update, "1".to_string()),
                (EventKind::Create, "x".to_string()),
                (EventKind::Delete, "x".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_primary_key_is_an_error() {
        let index = MemoryIndex::new();
        let err = index
            .handle_event(&event(EventKind::Create, json!({"name": "a"})), &target())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no primary key field 'id'"));
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_data() {
        let index = MemoryIndex::new();
        let docs = vec![
            json!({"id": 1}).as_object().cloned().unwrap(),
            json!({"id": 2}).as_object().cloned().unwrap(),
        ];
        index.add_full_data("users", "id", docs).await.unwrap();
        assert_eq!(index.documents("users").len(), 2);
        assert_eq!(
            index.calls(),
            vec![SinkCall::FullData {
                index: "users".to_string(),
                documents: 2
            }]
        );
    }
}

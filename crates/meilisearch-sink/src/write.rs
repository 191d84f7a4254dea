//! Turning change events into Meilisearch write requests.

use serde_json::Value;
use sync_core::{DataEvent, Document, EventKind, SyncTarget};

use crate::MeiliError;

/// One write request against an index.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Add or replace documents.
    Upsert(Vec<Document>),
    /// Delete documents by primary key.
    Delete(Vec<Value>),
}

impl WriteOp {
    pub fn len(&self) -> usize {
        match self {
            WriteOp::Upsert(docs) => docs.len(),
            WriteOp::Delete(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group events into as few requests as possible without reordering them.
///
/// Consecutive creates/updates become one upsert, consecutive deletes one
/// delete-batch. A delete between two upserts splits them, otherwise a
/// re-created document could be deleted after the fact.
pub fn plan_batch(target: &SyncTarget, events: &[DataEvent]) -> Result<Vec<WriteOp>, MeiliError> {
    let mut ops: Vec<WriteOp> = Vec::new();

    for event in events {
        match event.kind {
            EventKind::Create | EventKind::Update => {
                let doc = target.project(&event.data);
                if target.primary_key_of(&doc).is_none() {
                    return Err(MeiliError::MissingPrimaryKey(target.primary_key.clone()));
                }
                match ops.last_mut() {
                    Some(WriteOp::Upsert(docs)) => docs.push(doc),
                    _ => ops.push(WriteOp::Upsert(vec![doc])),
                }
            }
            EventKind::Delete => {
                let id = target
                    .primary_key_of(&event.data)
                    .cloned()
                    .ok_or_else(|| MeiliError::MissingPrimaryKey(target.primary_key.clone()))?;
                match ops.last_mut() {
                    Some(WriteOp::Delete(ids)) => ids.push(id),
                    _ => ops.push(WriteOp::Delete(vec![id])),
                }
            }
        }
    }

    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkpoint::ProgressMarker;
    use serde_json::json;
    use std::collections::BTreeMap;
    use sync_core::{Batching, SourceId, SyncId};

    fn target() -> SyncTarget {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Some("title".to_string()));
        SyncTarget {
            id: SyncId(1),
            label: String::new(),
            source: SourceId(1),
            table: "books".to_string(),
            index: "books".to_string(),
            primary_key: "id".to_string(),
            full_sync: false,
            enabled: true,
            fields: Some(fields),
            batching: Batching::unbatched(),
        }
    }

    fn event(kind: EventKind, data: Value) -> DataEvent {
        DataEvent {
            table: "books".to_string(),
            kind,
            data: data.as_object().cloned().unwrap(),
            progress: ProgressMarker::new(json!({})),
        }
    }

    #[test]
    fn test_plan_groups_consecutive_runs() {
        let events = vec![
            event(EventKind::Create, json!({"id": 1, "name": "a", "price": 3})),
            event(EventKind::Update, json!({"id": 2, "name": "b"})),
            event(EventKind::Delete, json!({"id": 1})),
            event(EventKind::Delete, json!({"id": 2})),
            event(EventKind::Create, json!({"id": 1, "name": "c"})),
        ];

        let ops = plan_batch(&target(), &events).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            WriteOp::Upsert(vec![
                json!({"id": 1, "title": "a"}).as_object().cloned().unwrap(),
                json!({"id": 2, "title": "b"}).as_object().cloned().unwrap(),
            ])
        );
        assert_eq!(ops[1], WriteOp::Delete(vec![json!(1), json!(2)]));
        assert_eq!(ops[2].len(), 1);
    }

    #[test]
    fn test_plan_rejects_missing_primary_key() {
        let err = plan_batch(&target(), &[event(EventKind::Delete, json!({"name": "a"}))])
            .unwrap_err();
        assert!(matches!(err, MeiliError::MissingPrimaryKey(ref pk) if pk == "id"));
    }

    #[test]
    fn test_plan_empty() {
        assert!(plan_batch(&target(), &[]).unwrap().is_empty());
    }
}

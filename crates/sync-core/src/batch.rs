//! Per-target event buffer.

use crate::event::DataEvent;

/// Events accumulated for one sync target and not yet applied to its index.
///
/// Events keep their dispatch order. The owner applies [`EventBatch::events`]
/// to the index and calls [`EventBatch::clear`] only once the write succeeded,
/// so an interrupted flush leaves the batch as it was.
#[derive(Debug, Default, Clone)]
pub struct EventBatch {
    events: Vec<DataEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: DataEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[DataEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use checkpoint::ProgressMarker;
    use serde_json::json;

    fn event(n: i64) -> DataEvent {
        DataEvent {
            table: "users".to_string(),
            kind: EventKind::Create,
            data: json!({"id": n}).as_object().cloned().unwrap(),
            progress: ProgressMarker::new(json!({"offset": n})),
        }
    }

    #[test]
    fn test_batch_keeps_order_and_clears() {
        let mut batch = EventBatch::new();
        assert!(batch.is_empty());

        for n in 1..=3 {
            batch.push(event(n));
        }
        assert_eq!(batch.len(), 3);
        let ids: Vec<_> = batch.events().iter().map(|e| e.data["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}

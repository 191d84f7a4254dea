//! Mutable state shared by a runner's loops.

use checkpoint::ProgressMarker;
use std::collections::{BTreeSet, HashMap};
use sync_core::{DataEvent, EventBatch, Statistics, SyncTarget};

/// One sync target with its pending batch.
pub(crate) struct TargetState {
    pub target: SyncTarget,
    pub batch: EventBatch,
    /// Sequence number of the oldest buffered event and the marker that was
    /// current before it arrived.
    pending_since: Option<(u64, Option<ProgressMarker>)>,
}

impl TargetState {
    fn new(target: SyncTarget) -> Self {
        Self {
            target,
            batch: EventBatch::new(),
            pending_since: None,
        }
    }

    pub fn buffer(&mut self, event: DataEvent, seq: u64, previous: Option<ProgressMarker>) {
        if self.batch.is_empty() {
            self.pending_since = Some((seq, previous));
        }
        self.batch.push(event);
    }

    /// Drop the batch once the index acknowledged it.
    pub fn flushed(&mut self) {
        self.batch.clear();
        self.pending_since = None;
    }
}

/// Everything guarded by the runner lock: batches, markers and counters.
pub(crate) struct RunnerState {
    pub targets: Vec<TargetState>,
    by_table: HashMap<String, Vec<usize>>,
    current: Option<ProgressMarker>,
    persisted: Option<ProgressMarker>,
    seq: u64,
    pub stats: Statistics,
}

impl RunnerState {
    pub fn new(targets: Vec<SyncTarget>, progress: Option<ProgressMarker>) -> Self {
        let mut by_table: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, target) in targets.iter().enumerate() {
            by_table.entry(target.table.clone()).or_default().push(idx);
        }
        Self {
            targets: targets.into_iter().map(TargetState::new).collect(),
            by_table,
            current: progress.clone(),
            persisted: progress,
            seq: 0,
            stats: Statistics::new(),
        }
    }

    /// Distinct tables of interest, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|t| t.target.table.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Indexes of the targets fed by `table`.
    pub fn targets_for(&self, table: &str) -> Vec<usize> {
        self.by_table.get(table).cloned().unwrap_or_default()
    }

    /// Make `marker` current. Returns the event's sequence number and the
    /// marker it replaces.
    pub fn advance(&mut self, marker: ProgressMarker) -> (u64, Option<ProgressMarker>) {
        self.seq += 1;
        let previous = self.current.replace(marker);
        (self.seq, previous)
    }

    /// Furthest marker whose events have all reached the index: the current
    /// one, or the one preceding the oldest event still buffered.
    pub fn safe_marker(&self) -> Option<&ProgressMarker> {
        self.targets
            .iter()
            .filter_map(|t| t.pending_since.as_ref())
            .min_by_key(|(seq, _)| *seq)
            .map_or(self.current.as_ref(), |(_, previous)| previous.as_ref())
    }

    /// Marker to persist, if it differs from the last persisted one.
    pub fn checkpoint_due(&self) -> Option<ProgressMarker> {
        match self.safe_marker() {
            Some(marker) if self.persisted.as_ref() != Some(marker) => Some(marker.clone()),
            _ => None,
        }
    }

    pub fn mark_persisted(&mut self, marker: ProgressMarker) {
        self.persisted = Some(marker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::{Batching, EventKind, SourceId, SyncId};

    fn target(id: u64, table: &str, index: &str) -> SyncTarget {
        SyncTarget {
            id: SyncId(id),
            label: String::new(),
            source: SourceId(1),
            table: table.to_string(),
            index: index.to_string(),
            primary_key: "id".to_string(),
            full_sync: false,
            enabled: true,
            fields: None,
            batching: Batching {
                insert_size: Some(10),
                insert_interval: None,
            },
        }
    }

    fn marker(n: u64) -> ProgressMarker {
        ProgressMarker::new(json!({ "n": n }))
    }

    fn event(n: u64) -> DataEvent {
        DataEvent {
            table: "users".to_string(),
            kind: EventKind::Create,
            data: json!({ "id": n }).as_object().cloned().unwrap(),
            progress: marker(n),
        }
    }

    #[test]
    fn test_fan_out_by_table() {
        let state = RunnerState::new(
            vec![
                target(1, "users", "a"),
                target(2, "users", "b"),
                target(3, "orders", "c"),
            ],
            None,
        );
        assert_eq!(state.tables(), vec!["orders", "users"]);
        assert_eq!(state.targets_for("users"), vec![0, 1]);
        assert_eq!(state.targets_for("orders"), vec![2]);
        assert!(state.targets_for("missing").is_empty());
    }

    #[test]
    fn test_safe_marker_holds_back_for_buffered_events() {
        let mut state = RunnerState::new(
            vec![target(1, "users", "a"), target(2, "users", "b")],
            Some(marker(0)),
        );
        assert_eq!(state.checkpoint_due(), None);

        let (seq, previous) = state.advance(marker(1));
        state.targets[0].buffer(event(1), seq, previous);
        assert_eq!(state.safe_marker(), Some(&marker(0)));
        assert_eq!(state.checkpoint_due(), None);

        let (seq, previous) = state.advance(marker(2));
        state.targets[1].buffer(event(2), seq, previous);
        state.targets[0].flushed();
        assert_eq!(state.safe_marker(), Some(&marker(1)));
        assert_eq!(state.checkpoint_due(), Some(marker(1)));
        state.mark_persisted(marker(1));
        assert_eq!(state.checkpoint_due(), None);

        state.targets[1].flushed();
        assert!(state.targets.iter().all(|t| t.batch.is_empty()));
        assert_eq!(state.checkpoint_due(), Some(marker(2)));
    }

    #[test]
    fn test_safe_marker_without_prior_progress() {
        let mut state = RunnerState::new(vec![target(1, "users", "a")], None);
        let (seq, previous) = state.advance(marker(1));
        state.targets[0].buffer(event(1), seq, previous);
        assert_eq!(state.safe_marker(), None);
        assert_eq!(state.checkpoint_due(), None);
        assert_eq!(state.advance(marker(2)), (2, Some(marker(1))));
    }
}

//! Per-target event statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event::EventKind;
use crate::types::{SourceId, SyncId};

/// Durable statistics record: `count` events of `kind` applied for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub source: SourceId,
    pub sync: SyncId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub count: u64,
    pub created_at: DateTime<Utc>,
}

/// Event counters accumulated since the last statistics flush.
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    counts: BTreeMap<SyncId, BTreeMap<EventKind, u64>>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sync: SyncId, kind: EventKind) {
        *self
            .counts
            .entry(sync)
            .or_default()
            .entry(kind)
            .or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, sync: SyncId, kind: EventKind) -> u64 {
        self.counts
            .get(&sync)
            .and_then(|kinds| kinds.get(&kind))
            .copied()
            .unwrap_or(0)
    }

    /// Counters per target, in target order.
    pub fn iter(&self) -> impl Iterator<Item = (SyncId, &BTreeMap<EventKind, u64>)> {
        self.counts.iter().map(|(sync, kinds)| (*sync, kinds))
    }

    /// One record per (target, kind) pair.
    pub fn to_logs(&self, source: SourceId, now: DateTime<Utc>) -> Vec<SyncLog> {
        self.iter()
            .flat_map(|(sync, kinds)| {
                kinds.iter().map(move |(kind, count)| SyncLog {
                    source,
                    sync,
                    kind: *kind,
                    count: *count,
                    created_at: now,
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_to_logs() {
        let mut stats = Statistics::new();
        assert!(stats.is_empty());
        assert!(stats.to_logs(SourceId(1), Utc::now()).is_empty());

        stats.record(SyncId(2), EventKind::Create);
        stats.record(SyncId(2), EventKind::Create);
        stats.record(SyncId(2), EventKind::Delete);
        stats.record(SyncId(1), EventKind::Update);

        assert_eq!(stats.count(SyncId(2), EventKind::Create), 2);
        assert_eq!(stats.count(SyncId(3), EventKind::Create), 0);

        let now = Utc::now();
        let logs = stats.to_logs(SourceId(1), now);
        let summary: Vec<_> = logs.iter().map(|l| (l.sync, l.kind, l.count)).collect();
        assert_eq!(
            summary,
            vec![
                (SyncId(1), EventKind::Update, 1),
                (SyncId(2), EventKind::Create, 2),
                (SyncId(2), EventKind::Delete, 1),
            ]
        );
        assert!(logs.iter().all(|l| l.source == SourceId(1) && l.created_at == now));

        stats.clear();
        assert!(stats.is_empty());
    }
}

//! Change events produced by source connectors.

use checkpoint::ProgressMarker;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row as JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Kind of a row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row change in one source table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataEvent {
    pub table: String,
    pub kind: EventKind,
    /// Row after the change; for deletes, at least the primary key.
    pub data: Document,
    /// Position of the stream once this event has been consumed.
    pub progress: ProgressMarker,
}

/// One entry of a source's change stream.
///
/// `Progress` carries no row: connectors emit it to move the durable position
/// forward while nothing changed in the synced tables.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Data(DataEvent),
    Progress(ProgressMarker),
}

impl ChangeEvent {
    pub fn progress(&self) -> &ProgressMarker {
        match self {
            ChangeEvent::Data(event) => &event.progress,
            ChangeEvent::Progress(marker) => marker,
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            ChangeEvent::Data(event) => Some(&event.table),
            ChangeEvent::Progress(_) => None,
        }
    }
}

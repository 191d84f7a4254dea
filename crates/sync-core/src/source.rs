//! Source connector traits.
//!
//! A connector reads one source: its change stream for incremental sync and,
//! on demand, the full content of a table for the initial load. Connectors
//! are built per runner by a [`ConnectorFactory`], seeded with the last
//! durable [`ProgressMarker`] and the tables the runner cares about.

use async_trait::async_trait;
use checkpoint::ProgressMarker;
use futures::stream::BoxStream;

use crate::event::{ChangeEvent, Document};
use crate::types::Source;

/// Chunks of rows read during a full-data extraction.
pub type FullDataStream<'a> = BoxStream<'a, anyhow::Result<Vec<Document>>>;

/// Trait for a stream of changes from a source
#[async_trait]
pub trait ChangeStream: Send {
    /// Get the next change event from the stream.
    ///
    /// Live streams never return None; they wait for the next change instead.
    /// None means the stream is exhausted and cannot be resumed: a new
    /// connector has to be built from the last checkpoint.
    async fn next(&mut self) -> Option<anyhow::Result<ChangeEvent>>;
}

/// Trait for sources that support full and incremental sync
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Read every row of `table`, at most `chunk_size` rows per chunk.
    fn full_data<'a>(&'a self, table: &'a str, chunk_size: usize) -> FullDataStream<'a>;

    /// Start streaming changes from the position the connector was seeded with.
    async fn changes(self: Box<Self>) -> anyhow::Result<Box<dyn ChangeStream>>;
}

/// Builds connectors for configured sources.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Create a connector for `source`, resuming after `progress` (from the
    /// beginning when None) and restricted to `tables`.
    async fn connect(
        &self,
        source: &Source,
        progress: Option<ProgressMarker>,
        tables: Vec<String>,
    ) -> anyhow::Result<Box<dyn SourceConnector>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DataEvent, EventKind};
    use futures::stream::{self, StreamExt, TryStreamExt};
    use serde_json::json;
    use std::collections::VecDeque;

    struct VecStream(VecDeque<ChangeEvent>);

    #[async_trait]
    impl ChangeStream for VecStream {
        async fn next(&mut self) -> Option<anyhow::Result<ChangeEvent>> {
            self.0.pop_front().map(Ok)
        }
    }

    struct VecConnector {
        rows: Vec<Document>,
        events: Vec<ChangeEvent>,
    }

    #[async_trait]
    impl SourceConnector for VecConnector {
        fn full_data<'a>(&'a self, _table: &'a str, chunk_size: usize) -> FullDataStream<'a> {
            stream::iter(self.rows.chunks(chunk_size).map(|c| Ok(c.to_vec()))).boxed()
        }

        async fn changes(self: Box<Self>) -> anyhow::Result<Box<dyn ChangeStream>> {
            Ok(Box::new(VecStream(self.events.into())))
        }
    }

    #[test]
    fn test_connector_as_trait_object() {
        let rows = (0..5)
            .map(|i| json!({ "id": i }).as_object().cloned().unwrap())
            .collect();
        let marker = ProgressMarker::new(json!({"pos": 1}));
        let events = vec![
            ChangeEvent::Data(DataEvent {
                table: "users".to_string(),
                kind: EventKind::Create,
                data: json!({"id": 9}).as_object().cloned().unwrap(),
                progress: marker.clone(),
            }),
            ChangeEvent::Progress(marker.clone()),
        ];
        let connector: Box<dyn SourceConnector> = Box::new(VecConnector { rows, events });

        tokio_test::block_on(async {
            let chunks: Vec<_> = connector.full_data("users", 2).try_collect().await.unwrap();
            assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);

            let mut changes = connector.changes().await.unwrap();
            let first = changes.next().await.unwrap().unwrap();
            assert_eq!(first.table(), Some("users"));
            assert_eq!(first.progress(), &marker);
            assert_eq!(changes.next().await.unwrap().unwrap().table(), None);
            assert!(changes.next().await.is_none());
        });
    }
}

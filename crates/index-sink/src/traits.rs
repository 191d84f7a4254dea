//! IndexSink trait definition.

use anyhow::Result;
use sync_core::{DataEvent, Document, SyncTarget};

/// Trait for writing change events to a search index.
///
/// Implementations must apply events in the order given, and writes must be
/// idempotent: after a restart the runner re-delivers everything since the
/// last checkpoint, so the same create/update/delete can arrive twice.
///
/// # Usage Pattern
///
/// The runner holds one `Arc<dyn IndexSink>` shared by all of its targets:
///
/// ```ignore
/// if !sink.index_exists(&target.index).await? {
///     sink.add_full_data(&target.index, &target.primary_key, rows).await?;
/// }
/// sink.handle_event(&event, &target).await?;
/// sink.handle_events(&target, batch.events()).await?;
/// ```
#[async_trait::async_trait]
pub trait IndexSink: Send + Sync {
    /// Whether `index` already exists. Gates the initial full-data load.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Bulk-load rows into `index`, creating it with `primary_key` if needed.
    ///
    /// Rows are already projected through the target's field filter.
    async fn add_full_data(&self, index: &str, primary_key: &str, documents: Vec<Document>)
        -> Result<()>;

    /// Apply a single change to the target's index.
    async fn handle_event(&self, event: &DataEvent, target: &SyncTarget) -> Result<()>;

    /// Apply buffered changes to the target's index, in order.
    ///
    /// The default applies them one by one; sinks with a bulk API override it.
    async fn handle_events(&self, target: &SyncTarget, events: &[DataEvent]) -> Result<()> {
        for event in events {
            self.handle_event(event, target).await?;
        }
        Ok(())
    }
}

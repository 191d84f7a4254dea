//! Sink that writes nothing.

use anyhow::Result;
use sync_core::{DataEvent, Document, SyncTarget};
use tracing::info;

use crate::IndexSink;

/// Logs every write instead of performing it.
///
/// Reports every index as missing, so a dry run also walks through the
/// full-data bootstrap of `full_sync` targets.
#[derive(Debug, Default, Clone)]
pub struct DryRunSink;

#[async_trait::async_trait]
impl IndexSink for DryRunSink {
    async fn index_exists(&self, _index: &str) -> Result<bool> {
        Ok(false)
    }

    async fn add_full_data(
        &self,
        index: &str,
        primary_key: &str,
        documents: Vec<Document>,
    ) -> Result<()> {
        info!(
            "[dry-run] would add {} documents to index '{index}' (primary key '{primary_key}')",
            documents.len()
        );
        Ok(())
    }

    async fn handle_event(&self, event: &DataEvent, target: &SyncTarget) -> Result<()> {
        info!(
            "[dry-run] would apply {} on '{}' to index '{}'",
            event.kind, event.table, target.index
        );
        Ok(())
    }

    async fn handle_events(&self, target: &SyncTarget, events: &[DataEvent]) -> Result<()> {
        if !events.is_empty() {
            info!(
                "[dry-run] would apply {} buffered events to index '{}'",
                events.len(),
                target.index
            );
        }
        Ok(())
    }
}

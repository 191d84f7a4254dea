//! Initial full-data load of `full_sync` targets.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use index_sink::IndexSink;
use sync_core::{Source, SourceConnector, SyncTarget};
use tracing::info;

/// Load the full dataset of every `full_sync` target whose index is missing.
///
/// Runs before the change stream is opened, so no incremental event reaches
/// a target before its bootstrap completed.
pub(crate) async fn full_sync(
    source: &Source,
    targets: &[SyncTarget],
    connector: &dyn SourceConnector,
    sink: &dyn IndexSink,
) -> Result<()> {
    for target in targets {
        if !target.full_sync {
            continue;
        }
        let exists = sink
            .index_exists(&target.index)
            .await
            .with_context(|| format!("Failed to check index \"{}\"", target.index))?;
        if exists {
            continue;
        }

        let count = load_table(target, connector, sink).await.with_context(|| {
            format!(
                "Full data sync for table \"{}.{}\" failed",
                source.label, target.table
            )
        })?;

        if count > 0 {
            info!(
                "Full data sync for table \"{}.{}\" done! {count} documents added.",
                source.label, target.table
            );
        } else {
            info!(
                "Full data sync for table \"{}.{}\" done! No data found.",
                source.label, target.table
            );
        }
    }
    Ok(())
}

async fn load_table(
    target: &SyncTarget,
    connector: &dyn SourceConnector,
    sink: &dyn IndexSink,
) -> Result<usize> {
    let chunk_size = target.batching.full_data_chunk_size();
    let mut chunks = connector.full_data(&target.table, chunk_size);
    let mut count = 0;

    while let Some(chunk) = chunks.try_next().await? {
        if chunk.is_empty() {
            continue;
        }
        count += chunk.len();
        let documents = chunk.iter().map(|doc| target.project(doc)).collect();
        sink.add_full_data(&target.index, &target.primary_key, documents)
            .await?;
    }
    Ok(count)
}

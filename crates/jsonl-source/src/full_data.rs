//! Snapshot reader for full-data sync.

use anyhow::{anyhow, Context};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use sync_core::{Document, FullDataStream};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::JsonlConfig;

enum Snapshot {
    Pending(PathBuf),
    Reading(Lines<BufReader<File>>),
    Done,
}

/// Stream `<snapshot_dir>/<table>.jsonl` in chunks of `chunk_size` documents.
///
/// A missing snapshot file yields no chunks: the table is empty.
pub(crate) fn read_snapshot<'a>(
    config: &JsonlConfig,
    table: &'a str,
    chunk_size: usize,
) -> FullDataStream<'a> {
    let Some(dir) = config.snapshot_dir.clone() else {
        let err = anyhow!(
            "Full sync of table '{table}' needs snapshot_dir in the connection settings of {}",
            config.path.display()
        );
        return stream::once(async move { Err(err) }).boxed();
    };
    let chunk_size = chunk_size.max(1);
    let path = dir.join(format!("{table}.jsonl"));

    stream::try_unfold(Snapshot::Pending(path.clone()), move |state| {
        let path = path.clone();
        async move {
            let mut lines = match state {
                Snapshot::Pending(path) => match File::open(&path).await {
                    Ok(file) => BufReader::new(file).lines(),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!("No snapshot at {}", path.display());
                        return Ok(None);
                    }
                    Err(e) => {
                        return Err(anyhow::Error::from(e)
                            .context(format!("Failed to open snapshot {}", path.display())))
                    }
                },
                Snapshot::Reading(lines) => lines,
                Snapshot::Done => return Ok(None),
            };

            let mut chunk: Vec<Document> = Vec::with_capacity(chunk_size);
            while chunk.len() < chunk_size {
                let Some(line) = lines.next_line().await? else {
                    if chunk.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some((chunk, Snapshot::Done)));
                };
                if line.trim().is_empty() {
                    continue;
                }
                let doc: Document = serde_json::from_str(&line)
                    .with_context(|| format!("Invalid document in {}", path.display()))?;
                chunk.push(doc);
            }
            Ok(Some((chunk, Snapshot::Reading(lines))))
        }
    })
    .boxed()
}

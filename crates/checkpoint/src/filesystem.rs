//! Filesystem-based progress storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

use crate::store::{ProgressStore, StoredProgress};
use crate::ProgressMarker;

/// Filesystem implementation of ProgressStore trait.
///
/// Stores each key as `progress_<key>.json` in a directory. Writes go to a
/// temporary file first and are renamed into place, so a crash mid-write
/// leaves the previous marker intact.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("progress_{name}.json"))
    }
}

#[async_trait]
impl ProgressStore for FilesystemStore {
    async fn get(&self, key: &str) -> Result<Option<ProgressMarker>> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let stored: StoredProgress = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt progress file {}", path.display()))?;
        Ok(Some(stored.marker))
    }

    async fn set(&self, key: &str, marker: &ProgressMarker) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stored = StoredProgress {
            key: key.to_string(),
            marker: marker.clone(),
            updated_at: Utc::now(),
        };

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&stored)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!("Stored progress {} to {}", marker, path.display());
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Reset progress {key} ({})", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

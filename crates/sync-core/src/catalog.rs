//! Sources and sync targets loaded from YAML.
//!
//! ```yaml
//! sources:
//!   - id: 1
//!     label: shop
//!     type: jsonl
//!     connection:
//!       path: /var/lib/shop/changes.jsonl
//! syncs:
//!   - id: 1
//!     source: 1
//!     table: users
//!     index: users
//!     full_sync: true
//!     insert_size: 1000
//!     insert_interval: 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::types::{Source, SourceId, SyncId, SyncTarget};

/// Errors that can occur when loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Error reading catalog file
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Duplicate source id {0}")]
    DuplicateSource(SourceId),

    #[error("Duplicate sync id {0}")]
    DuplicateSync(SyncId),

    /// Sync references a source that is not defined
    #[error("Sync {sync} references unknown source {source_id}")]
    UnknownSource { sync: SyncId, source_id: SourceId },

    /// Two enabled syncs write the same table into the same index
    #[error("Syncs {first} and {second} both write table '{table}' of source {source_id} into index '{index}'")]
    DuplicateTarget {
        first: SyncId,
        second: SyncId,
        source_id: SourceId,
        table: String,
        index: String,
    },

    #[error("Sync {sync} has invalid batching: {reason}")]
    InvalidBatching { sync: SyncId, reason: String },
}

/// Everything the scheduler needs to know about what to replicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub syncs: Vec<SyncTarget>,
}

impl Catalog {
    /// Load and validate a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a catalog from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check referential integrity and batching values.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if !source_ids.insert(source.id) {
                return Err(CatalogError::DuplicateSource(source.id));
            }
        }

        let mut sync_ids = HashSet::new();
        for sync in &self.syncs {
            if !sync_ids.insert(sync.id) {
                return Err(CatalogError::DuplicateSync(sync.id));
            }
            if !source_ids.contains(&sync.source) {
                return Err(CatalogError::UnknownSource {
                    sync: sync.id,
                    source_id: sync.source,
                });
            }
            if sync.batching.insert_size == Some(0) {
                return Err(CatalogError::InvalidBatching {
                    sync: sync.id,
                    reason: "insert_size must be at least 1".to_string(),
                });
            }
            if sync.batching.insert_interval == Some(0) {
                return Err(CatalogError::InvalidBatching {
                    sync: sync.id,
                    reason: "insert_interval must be at least 1 second".to_string(),
                });
            }
        }

        let enabled: Vec<&SyncTarget> = self.syncs.iter().filter(|s| s.enabled).collect();
        for (i, first) in enabled.iter().enumerate() {
            if let Some(second) = enabled[i + 1..].iter().find(|other| {
                other.source == first.source
                    && other.table == first.table
                    && other.index == first.index
            }) {
                return Err(CatalogError::DuplicateTarget {
                    first: first.id,
                    second: second.id,
                    source_id: first.source,
                    table: first.table.clone(),
                    index: first.index.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Enabled sync targets of a source, in catalog order.
    pub fn enabled_targets(&self, source: SourceId) -> Vec<SyncTarget> {
        self.syncs
            .iter()
            .filter(|s| s.source == source && s.enabled)
            .cloned()
            .collect()
    }

    /// All sync targets of a source, enabled or not.
    pub fn targets(&self, source: SourceId) -> impl Iterator<Item = &SyncTarget> {
        self.syncs.iter().filter(move |s| s.source == source)
    }
}

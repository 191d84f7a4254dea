//! Configuration store backed by a catalog file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sync_core::{Catalog, Source, SourceId, SyncTarget};
use tokio::sync::RwLock;

/// Read access to configured sources and sync targets.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn sources(&self) -> Result<Vec<Source>>;

    async fn source(&self, id: SourceId) -> Result<Option<Source>>;

    /// Enabled sync targets of `source`.
    async fn enabled_targets(&self, source: SourceId) -> Result<Vec<SyncTarget>>;
}

/// In-memory catalog that can be swapped at runtime.
pub struct CatalogStore {
    path: Option<PathBuf>,
    catalog: RwLock<Catalog>,
}

impl CatalogStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            path: None,
            catalog: RwLock::new(catalog),
        }
    }

    /// Load a catalog file; [`CatalogStore::reload`] re-reads the same path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let catalog = Catalog::from_file(&path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?;
        Ok(Self {
            path: Some(path),
            catalog: RwLock::new(catalog),
        })
    }

    pub async fn snapshot(&self) -> Catalog {
        self.catalog.read().await.clone()
    }

    /// Swap in a new catalog and return what changed.
    pub async fn replace(&self, catalog: Catalog) -> CatalogDiff {
        let mut current = self.catalog.write().await;
        let diff = CatalogDiff::between(&current, &catalog);
        *current = catalog;
        diff
    }

    /// Re-read the catalog file. An invalid file leaves the current catalog
    /// in place.
    pub async fn reload(&self) -> Result<CatalogDiff> {
        let Some(path) = &self.path else {
            anyhow::bail!("Catalog was not loaded from a file");
        };
        let catalog = Catalog::from_file(path)
            .with_context(|| format!("Failed to reload catalog from {}", path.display()))?;
        Ok(self.replace(catalog).await)
    }
}

#[async_trait]
impl ConfigStore for CatalogStore {
    async fn sources(&self) -> Result<Vec<Source>> {
        Ok(self.catalog.read().await.sources.clone())
    }

    async fn source(&self, id: SourceId) -> Result<Option<Source>> {
        Ok(self.catalog.read().await.source(id).cloned())
    }

    async fn enabled_targets(&self, source: SourceId) -> Result<Vec<SyncTarget>> {
        Ok(self.catalog.read().await.enabled_targets(source))
    }
}

/// What the scheduler must do to move from one catalog to the next.
#[derive(Debug, Default, PartialEq)]
pub struct CatalogDiff {
    /// Removed or newly disabled sources.
    pub removed: Vec<SourceId>,
    /// New or newly enabled sources.
    pub added: Vec<Source>,
    /// Enabled sources whose record or sync targets changed.
    pub changed: Vec<Source>,
}

impl CatalogDiff {
    pub fn between(old: &Catalog, new: &Catalog) -> Self {
        let mut diff = Self::default();

        for before in old.sources.iter().filter(|s| s.enabled) {
            match new.source(before.id) {
                Some(after) if after.enabled => {}
                _ => diff.removed.push(before.id),
            }
        }

        for after in new.sources.iter().filter(|s| s.enabled) {
            match old.source(after.id) {
                Some(before) if before.enabled => {
                    let targets_changed = !old.targets(after.id).eq(new.targets(after.id));
                    if before != after || targets_changed {
                        diff.changed.push(after.clone());
                    }
                }
                _ => diff.added.push(after.clone()),
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

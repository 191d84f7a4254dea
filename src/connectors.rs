//! Connector registry: source type name → connector constructor.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use checkpoint::ProgressMarker;
use index_sync_jsonl_source::{JsonlConfig, JsonlSource};
use std::collections::BTreeMap;
use sync_core::{ConnectorFactory, Source, SourceConnector};

type Constructor = Box<
    dyn Fn(&Source, Option<ProgressMarker>, Vec<String>) -> Result<Box<dyn SourceConnector>>
        + Send
        + Sync,
>;

/// Builds connectors from a source's `type`.
pub struct ConnectorRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ConnectorRegistry {
    /// A registry with no connector types.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry with every built-in connector type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(index_sync_jsonl_source::SOURCE_TYPE, |source, progress, tables| {
            let config = JsonlConfig::from_connection(&source.connection)?;
            let connector = JsonlSource::new(config, progress.as_ref(), tables)?;
            Ok(Box::new(connector) as Box<dyn SourceConnector>)
        });
        registry
    }

    pub fn register<F>(&mut self, source_type: &str, constructor: F)
    where
        F: Fn(&Source, Option<ProgressMarker>, Vec<String>) -> Result<Box<dyn SourceConnector>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(source_type.to_string(), Box::new(constructor));
    }

    pub fn supports(&self, source_type: &str) -> bool {
        self.constructors.contains_key(source_type)
    }

    /// Registered type names, sorted.
    pub fn source_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl ConnectorFactory for ConnectorRegistry {
    async fn connect(
        &self,
        source: &Source,
        progress: Option<ProgressMarker>,
        tables: Vec<String>,
    ) -> Result<Box<dyn SourceConnector>> {
        let constructor = self.constructors.get(&source.source_type).ok_or_else(|| {
            anyhow!(
                "Unknown source type '{}' for source \"{}\" (supported: {})",
                source.source_type,
                source.label,
                self.source_types().join(", ")
            )
        })?;
        constructor(source, progress, tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::SourceId;

    fn source(source_type: &str, connection: serde_json::Value) -> Source {
        Source {
            id: SourceId(1),
            label: "main".to_string(),
            source_type: source_type.to_string(),
            connection: connection.as_object().cloned().unwrap(),
            enabled: true,
        }
    }

    #[test]
    fn test_defaults() {
        let registry = ConnectorRegistry::with_defaults();
        assert!(registry.supports("jsonl"));
        assert_eq!(registry.source_types(), vec!["jsonl"]);
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let registry = ConnectorRegistry::with_defaults();
        let err = registry
            .connect(&source("mysql", json!({})), None, vec![])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown source type 'mysql'"));
    }

    #[tokio::test]
    async fn test_jsonl_connection_is_validated() {
        let registry = ConnectorRegistry::with_defaults();
        let result = registry
            .connect(&source("jsonl", json!({"follow": false})), None, vec![])
            .await;
        assert!(result.is_err());

        let ok = registry
            .connect(&source("jsonl", json!({"path": "/tmp/x.jsonl"})), None, vec![])
            .await;
        assert!(ok.is_ok());
    }
}

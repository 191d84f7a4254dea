//! Opaque progress marker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connector-defined position in a change stream.
///
/// The runner never looks inside a marker: it only copies the marker of the
/// last event it dispatched and hands it back to the same connector type on
/// restart. Ordering between markers is defined by the connector alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressMarker(Value);

impl ProgressMarker {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a top-level field of an object marker.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Convert to CLI-friendly string format (compact JSON).
    pub fn to_cli_string(&self) -> String {
        self.0.to_string()
    }

    /// Parse the format produced by [`ProgressMarker::to_cli_string`].
    pub fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| anyhow::anyhow!("Invalid progress marker '{s}': {e}"))?;
        Ok(Self(value))
    }
}

impl From<Value> for ProgressMarker {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ProgressMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

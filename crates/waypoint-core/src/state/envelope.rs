//! Schema-versioned payload carried by sessions and recovery points.

use super::snapshot::AppSnapshot;
use crate::error::{Result, WaypointError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current envelope schema version.
pub const STATE_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

/// What a state envelope holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StateBody {
    Empty,
    /// A captured application snapshot.
    Snapshot(AppSnapshot),
    /// Caller-defined work context.
    Context(Value),
    /// A failure captured by an error boundary.
    Error(ErrorReport),
}

/// Details of a captured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A tagged, versioned state blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEnvelope {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub body: StateBody,
}

impl StateEnvelope {
    fn wrap(body: StateBody) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            body,
        }
    }

    pub fn empty() -> Self {
        Self::wrap(StateBody::Empty)
    }

    pub fn snapshot(snapshot: AppSnapshot) -> Self {
        Self::wrap(StateBody::Snapshot(snapshot))
    }

    pub fn context(context: Value) -> Self {
        Self::wrap(StateBody::Context(context))
    }

    pub fn error(report: ErrorReport) -> Self {
        Self::wrap(StateBody::Error(report))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.body, StateBody::Empty)
    }

    pub fn as_snapshot(&self) -> Option<&AppSnapshot> {
        match &self.body {
            StateBody::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&Value> {
        match &self.body {
            StateBody::Context(context) => Some(context),
            _ => None,
        }
    }

    /// Rejects envelopes written by a newer schema than this build understands.
    pub fn ensure_supported(&self) -> Result<()> {
        if self.schema_version > STATE_SCHEMA_VERSION {
            return Err(WaypointError::migration(format!(
                "state envelope schema {} is newer than supported {}",
                self.schema_version, STATE_SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}

impl Default for StateEnvelope {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let envelope = StateEnvelope::context(json!({"step": 3}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"schemaVersion": 1, "body": {"kind": "context", "data": {"step": 3}}})
        );

        let empty = serde_json::to_value(StateEnvelope::empty()).unwrap();
        assert_eq!(empty, json!({"schemaVersion": 1, "body": {"kind": "empty"}}));
    }

    #[test]
    fn test_missing_schema_version_defaults() {
        let envelope: StateEnvelope =
            serde_json::from_value(json!({"body": {"kind": "empty"}})).unwrap();
        assert_eq!(envelope.schema_version, STATE_SCHEMA_VERSION);
        assert!(envelope.is_empty());
    }

    #[test]
    fn test_newer_schema_rejected() {
        let envelope = StateEnvelope {
            schema_version: STATE_SCHEMA_VERSION + 1,
            body: StateBody::Empty,
        };
        assert!(matches!(
            envelope.ensure_supported(),
            Err(WaypointError::Migration(_))
        ));
    }
}

//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs represent the versioned schema for persisting data.
//! They are private to the infrastructure layer and handle the evolution
//! of the storage format over time.
//!
//! ## Schema Versioning (Semantic Versioning)
//!
//! - **MAJOR (X.0.0)**: Breaking changes (field removal, type changes)
//! - **MINOR (1.X.0)**: Backward-compatible additions (new optional fields)
//!
//! ### Session Version History
//! - **1.0.0**: Initial schema, opaque `context` blob
//! - **1.1.0**: `context` becomes a state envelope, adds `revision`
//!
//! ### RecoveryPoint Version History
//! - **1.0.0**: Initial schema, opaque `state` blob
//! - **1.1.0**: `state` becomes a state envelope
//!
//! ### Config Version History
//! - **1.0.0**: Initial schema

mod config;
mod recovery_point;
mod session;

pub use config::{ConfigV1_0_0, create_config_migrator};
pub use recovery_point::{RecoveryPointV1_0_0, RecoveryPointV1_1_0, create_recovery_point_migrator};
pub use session::{SessionV1_0_0, SessionV1_1_0, create_session_migrator};

use serde_json::Value;
use waypoint_core::state::{AppSnapshot, StateEnvelope};

const SNAPSHOT_FIELDS: [&str; 4] = ["tasks", "currentWorkspace", "formState", "viewState"];

/// Lifts a pre-envelope JSON blob into a [`StateEnvelope`].
///
/// Objects made only of snapshot subtrees become snapshots, objects that
/// already look like an envelope are kept, anything else is context.
pub(crate) fn envelope_from_legacy(value: Value) -> StateEnvelope {
    match &value {
        Value::Null => StateEnvelope::empty(),
        Value::Object(map) if map.contains_key("body") => {
            match serde_json::from_value::<StateEnvelope>(value.clone()) {
                Ok(envelope) => envelope,
                Err(_) => StateEnvelope::context(value),
            }
        }
        Value::Object(map)
            if !map.is_empty() && map.keys().all(|k| SNAPSHOT_FIELDS.contains(&k.as_str())) =>
        {
            match serde_json::from_value::<AppSnapshot>(value.clone()) {
                Ok(snapshot) => StateEnvelope::snapshot(snapshot),
                Err(_) => StateEnvelope::context(value),
            }
        }
        _ => StateEnvelope::context(value),
    }
}

//! Stored recovery point DTOs and migrations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use version_migrate::{IntoDomain, MigratesTo, Versioned};

use super::envelope_from_legacy;
use waypoint_core::checkpoint::{RecoveryKind, StoredRecoveryPoint};
use waypoint_core::session::{DeviceInfo, SessionRefs};
use waypoint_core::state::StateEnvelope;

/// Represents V1.0.0 of the recovery point schema: untyped `state` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct RecoveryPointV1_0_0 {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub refs: SessionRefs,
    pub kind: RecoveryKind,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_archived: bool,
}

/// Represents V1.1.0 of the recovery point schema: enveloped `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
pub struct RecoveryPointV1_1_0 {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub refs: SessionRefs,
    pub kind: RecoveryKind,
    pub state: StateEnvelope,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_archived: bool,
}

impl MigratesTo<RecoveryPointV1_1_0> for RecoveryPointV1_0_0 {
    fn migrate(self) -> RecoveryPointV1_1_0 {
        RecoveryPointV1_1_0 {
            id: self.id,
            owner_id: self.owner_id,
            session_id: self.session_id,
            description: self.description,
            refs: self.refs,
            kind: self.kind,
            state: envelope_from_legacy(self.state),
            device_info: self.device_info,
            tags: self.tags,
            metadata: self.metadata,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_archived: self.is_archived,
        }
    }
}

impl IntoDomain<StoredRecoveryPoint> for RecoveryPointV1_1_0 {
    fn into_domain(self) -> StoredRecoveryPoint {
        StoredRecoveryPoint {
            id: self.id,
            owner_id: self.owner_id,
            session_id: self.session_id,
            description: self.description,
            refs: self.refs,
            kind: self.kind,
            state: self.state,
            device_info: self.device_info,
            tags: self.tags,
            metadata: self.metadata,
            created_at: self.created_at,
            expires_at: self.expires_at,
            is_archived: self.is_archived,
        }
    }
}

impl version_migrate::FromDomain<StoredRecoveryPoint> for RecoveryPointV1_1_0 {
    fn from_domain(point: StoredRecoveryPoint) -> Self {
        RecoveryPointV1_1_0 {
            id: point.id,
            owner_id: point.owner_id,
            session_id: point.session_id,
            description: point.description,
            refs: point.refs,
            kind: point.kind,
            state: point.state,
            device_info: point.device_info,
            tags: point.tags,
            metadata: point.metadata,
            created_at: point.created_at,
            expires_at: point.expires_at,
            is_archived: point.is_archived,
        }
    }
}

/// Creates and configures a Migrator instance for stored recovery points.
///
/// # Migration Path
///
/// - V1.0.0 → V1.1.0: Wraps `state` in a state envelope
/// - V1.1.0 → StoredRecoveryPoint: Converts DTO to domain model
pub fn create_recovery_point_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();

    let path = version_migrate::Migrator::define("recovery_point")
        .from::<RecoveryPointV1_0_0>()
        .step::<RecoveryPointV1_1_0>()
        .into_with_save::<StoredRecoveryPoint>();

    migrator
        .register(path)
        .expect("Failed to register recovery_point migration path");

    migrator
}

//! Session DTOs and migrations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use version_migrate::{IntoDomain, MigratesTo, Versioned};

use super::envelope_from_legacy;
use waypoint_core::session::{
    DeviceInfo, Session, SessionError, SessionRefs, SessionStatus, TimeEntry,
};
use waypoint_core::state::StateEnvelope;

/// Represents V1.0.0 of the session data schema.
/// Context is an opaque JSON blob and there is no revision counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct SessionV1_0_0 {
    pub id: String,
    pub owner_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub refs: SessionRefs,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_duration: Option<i64>,
    #[serde(default)]
    pub active_duration: Option<i64>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub last_error: Option<SessionError>,
    #[serde(default)]
    pub is_archived: bool,
}

/// Represents V1.1.0 of the session data schema.
/// Context becomes a tagged [`StateEnvelope`]; adds `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
pub struct SessionV1_1_0 {
    pub id: String,
    pub owner_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub refs: SessionRefs,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_duration: Option<i64>,
    #[serde(default)]
    pub active_duration: Option<i64>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    #[serde(default)]
    pub context: StateEnvelope,
    #[serde(default)]
    pub last_error: Option<SessionError>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub revision: u64,
}

/// Migration from V1.0.0 to V1.1.0: wraps the opaque context.
impl MigratesTo<SessionV1_1_0> for SessionV1_0_0 {
    fn migrate(self) -> SessionV1_1_0 {
        SessionV1_1_0 {
            id: self.id,
            owner_id: self.owner_id,
            status: self.status,
            refs: self.refs,
            started_at: self.started_at,
            last_active_at: self.last_active_at,
            completed_at: self.completed_at,
            total_duration: self.total_duration,
            active_duration: self.active_duration,
            time_entries: self.time_entries,
            devices: self.devices,
            context: envelope_from_legacy(self.context),
            last_error: self.last_error,
            is_archived: self.is_archived,
            revision: 0,
        }
    }
}

impl IntoDomain<Session> for SessionV1_1_0 {
    fn into_domain(self) -> Session {
        Session {
            id: self.id,
            owner_id: self.owner_id,
            status: self.status,
            refs: self.refs,
            started_at: self.started_at,
            last_active_at: self.last_active_at,
            completed_at: self.completed_at,
            total_duration: self.total_duration,
            active_duration: self.active_duration,
            time_entries: self.time_entries,
            devices: self.devices,
            context: self.context,
            last_error: self.last_error,
            is_archived: self.is_archived,
            revision: self.revision,
        }
    }
}

impl version_migrate::FromDomain<Session> for SessionV1_1_0 {
    fn from_domain(session: Session) -> Self {
        let Session {
            id,
            owner_id,
            status,
            refs,
            started_at,
            last_active_at,
            completed_at,
            total_duration,
            active_duration,
            time_entries,
            devices,
            context,
            last_error,
            is_archived,
            revision,
        } = session;

        SessionV1_1_0 {
            id,
            owner_id,
            status,
            refs,
            started_at,
            last_active_at,
            completed_at,
            total_duration,
            active_duration,
            time_entries,
            devices,
            context,
            last_error,
            is_archived,
            revision,
        }
    }
}

/// Creates and configures a Migrator instance for Session entities.
///
/// # Migration Path
///
/// - V1.0.0 → V1.1.0: Wraps `context` in a state envelope, adds `revision`
/// - V1.1.0 → Session: Converts DTO to domain model
pub fn create_session_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();

    let session_path = version_migrate::Migrator::define("session")
        .from::<SessionV1_0_0>()
        .step::<SessionV1_1_0>()
        .into_with_save::<Session>();

    migrator
        .register(session_path)
        .expect("Failed to register session migration path");

    migrator
}

//! Server-side recovery points created by the lifecycle service.

use crate::session::{DeviceInfo, SessionRefs};
use crate::state::StateEnvelope;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin of a stored recovery point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryKind {
    Auto,
    Manual,
    Error,
    System,
}

impl RecoveryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryKind::Auto => "auto",
            RecoveryKind::Manual => "manual",
            RecoveryKind::Error => "error",
            RecoveryKind::System => "system",
        }
    }
}

impl std::str::FromStr for RecoveryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RecoveryKind::Auto),
            "manual" => Ok(RecoveryKind::Manual),
            "error" => Ok(RecoveryKind::Error),
            "system" => Ok(RecoveryKind::System),
            other => Err(format!("unknown recovery point kind '{other}'")),
        }
    }
}

/// Lifecycle tags attached by the service.
pub mod tags {
    pub const SESSION_START: &str = "session-start";
    pub const SESSION_RESUME: &str = "session-resume";
    pub const SESSION_PAUSE: &str = "session-pause";
    pub const SESSION_COMPLETE: &str = "session-complete";
    pub const CONTEXT_UPDATE: &str = "context-update";
    pub const STATE_SAVE: &str = "state-save";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecoveryPoint {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Work-item scope captured at creation.
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

impl StoredRecoveryPoint {
    /// Gives auto points without an explicit expiry `created_at + retention`.
    pub fn apply_retention(&mut self, retention: Duration) {
        if self.kind == RecoveryKind::Auto && self.expires_at.is_none() {
            self.expires_at = Some(self.created_at + retention);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

//! Store key layout.
//!
//! These keys are the only on-disk contract of the window-side store, so
//! they are built in exactly one place.

use chrono::{DateTime, SecondsFormat, Utc};

pub const TASKS_KEY: &str = "tasks";
pub const CURRENT_WORKSPACE_KEY: &str = "currentWorkspace";
pub const FORM_PREFIX: &str = "form:";
pub const VIEW_PREFIX: &str = "view:";

pub fn form_key(form_id: &str) -> String {
    format!("{FORM_PREFIX}{form_id}")
}

pub fn view_key(view_id: &str) -> String {
    format!("{VIEW_PREFIX}{view_id}")
}

/// Key of a session's recovery point list.
pub fn recovery_points_key(session_id: &str) -> String {
    format!("recovery-points-{session_id}")
}

/// Key of the snapshot payload a recovery point refers to.
///
/// `discriminator` keeps keys unique when two points share a millisecond.
pub fn snapshot_key(session_id: &str, timestamp: DateTime<Utc>, discriminator: &str) -> String {
    format!(
        "recovery-point-{session_id}-{}-{discriminator}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Key of a caller-named piece of session state.
pub fn session_state_key(session_id: &str, key: &str) -> String {
    format!("session-state-{session_id}-{key}")
}

//! Session domain model.
//!
//! A session is a bounded period of user activity with an explicit status
//! and cumulative time metrics. This is the "pure" domain model the
//! lifecycle service operates on, independent of any storage format.

use crate::clock::minutes_between;
use crate::state::StateEnvelope;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle status of a session.
///
/// `Expired` is never written by a transition; it is only reported by
/// [`Session::observed`] for an active session that went quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Expired,
}

impl SessionStatus {
    /// Whether an explicit transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Active, Paused)
                | (Paused, Active)
                | (Expired, Active)
                | (Active, Completed)
                | (Paused, Completed)
                | (Expired, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purpose of one contiguous interval of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeEntryType {
    #[default]
    Work,
    Break,
    Meeting,
    Planning,
    Review,
}

/// One contiguous interval of session activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole minutes, set when the entry is closed.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(rename = "type", default)]
    pub entry_type: TimeEntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TimeEntry {
    pub fn open(entry_type: TimeEntryType, description: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            ended_at: None,
            duration: None,
            entry_type,
            task: None,
            description: Some(description.into()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Closes the entry at `at` and records its rounded duration.
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.ended_at = Some(at);
        self.duration = Some(minutes_between(self.started_at, at).max(0));
    }
}

/// A window/device that touched the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub window_id: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub last_active_at: DateTime<Utc>,
}

/// Optional work-item references a session or recovery point is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item: Option<String>,
}

/// Last failure reported against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A tracked user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    pub owner_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub refs: SessionRefs,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Minutes from start to completion, set on completion.
    #[serde(default)]
    pub total_duration: Option<i64>,
    /// Sum of closed work entries, set on completion.
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
    /// Bumped by the repository on every stored update.
    #[serde(default)]
    pub revision: u64,
}

impl Session {
    /// Creates an active session with one open work entry.
    pub fn start(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        refs: SessionRefs,
        device: DeviceInfo,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            status: SessionStatus::Active,
            refs,
            started_at: now,
            last_active_at: now,
            completed_at: None,
            total_duration: None,
            active_duration: None,
            time_entries: vec![TimeEntry::open(TimeEntryType::Work, "Session started", now)],
            devices: vec![device],
            context: StateEnvelope::empty(),
            last_error: None,
            is_archived: false,
            revision: 0,
        }
    }

    /// Whether a stored active session has gone quiet for longer than `idle`.
    pub fn is_idle_expired(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        self.status == SessionStatus::Active && now - self.last_active_at > idle
    }

    /// Status as a reader should see it at `now`.
    pub fn observed_status(&self, now: DateTime<Utc>, idle: Duration) -> SessionStatus {
        if self.is_idle_expired(now, idle) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// A copy with read-time derivation applied. Nothing is persisted.
    pub fn observed(&self, now: DateTime<Utc>, idle: Duration) -> Session {
        let mut session = self.clone();
        session.status = self.observed_status(now, idle);
        session
    }

    pub fn open_entries(&self) -> impl Iterator<Item = &TimeEntry> {
        self.time_entries.iter().filter(|e| e.is_open())
    }

    /// Opens a new entry.
    pub fn open_entry(&mut self, entry_type: TimeEntryType, description: &str, at: DateTime<Utc>) {
        self.time_entries.push(TimeEntry::open(entry_type, description, at));
    }

    /// Closes every open entry at `at`. Returns how many were closed.
    pub fn close_open_entries(&mut self, at: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for entry in self.time_entries.iter_mut().filter(|e| e.is_open()) {
            entry.close(at);
            closed += 1;
        }
        closed
    }

    /// Sum of closed work-entry durations in minutes.
    pub fn work_minutes(&self) -> i64 {
        self.time_entries
            .iter()
            .filter(|e| e.entry_type == TimeEntryType::Work)
            .filter_map(|e| e.duration)
            .sum()
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_active_at = at;
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

//! Per-window session manager.
//!
//! Owns the window's recovery point list and performs every checkpoint
//! synchronously against the store, so the unload path is no different from
//! any other. Persistence failures are logged and swallowed except where a
//! caller explicitly asked for a checkpoint.

use super::reset::RuntimeReset;
use super::snapshot::{RestorePlan, collect_app_state};
use super::sync::SyncMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;
use waypoint_core::checkpoint::{RecoveryPoint, SnapshotType, enforce_limit, merge_point, recent};
use waypoint_core::clock::Clock;
use waypoint_core::config::AutoSaveConfig;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::keys;
use waypoint_core::state::{StateEnvelope, SyncStateStore, SyncStateStoreExt};

pub const SESSION_STARTED: &str = "Session started";
pub const TAB_RESUMED: &str = "Tab resumed";
pub const AUTO_SAVED: &str = "Auto-saved recovery point";
pub const WINDOW_CLOSING: &str = "Window closing";

pub struct SessionManager {
    session_id: String,
    window_id: String,
    store: Arc<dyn SyncStateStore>,
    clock: Arc<dyn Clock>,
    reset: Arc<dyn RuntimeReset>,
    config: AutoSaveConfig,
    points: Vec<RecoveryPoint>,
    last_activity: DateTime<Utc>,
    visible: bool,
    sync: Option<broadcast::Sender<SyncMessage>>,
}

impl SessionManager {
    /// Creates a manager for `session_id`, or for a fresh session when
    /// `None`. Nothing is read or written until [`SessionManager::mount`].
    pub fn new(
        session_id: Option<String>,
        store: Arc<dyn SyncStateStore>,
        clock: Arc<dyn Clock>,
        reset: Arc<dyn RuntimeReset>,
        config: AutoSaveConfig,
    ) -> Self {
        let now = clock.now();
        Self {
            session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            window_id: Uuid::new_v4().to_string(),
            store,
            clock,
            reset,
            config,
            points: Vec::new(),
            last_activity: now,
            visible: true,
            sync: None,
        }
    }

    /// Publishes every local checkpoint on `sender`.
    pub fn connect(&mut self, sender: broadcast::Sender<SyncMessage>) {
        self.sync = Some(sender);
    }

    /// Loads the persisted point list and records "Session started".
    pub fn mount(&mut self) -> Option<String> {
        self.load();
        self.checkpoint_quietly(SESSION_STARTED)
    }

    /// Loads the persisted point list without recording anything.
    pub fn load(&mut self) {
        let key = keys::recovery_points_key(&self.session_id);
        let mut loaded: Vec<RecoveryPoint> = self.store.get_sync(&key, Vec::new());
        loaded.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.points = loaded;

        if !enforce_limit(&mut self.points, self.config.max_recovery_points).is_empty() {
            self.persist_points();
        }

        tracing::info!(
            session_id = %self.session_id,
            window_id = %self.window_id,
            points = self.points.len(),
            "[SessionManager] Loaded recovery points"
        );
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn recovery_points(&self) -> &[RecoveryPoint] {
        &self.points
    }

    /// Newest first, optionally only one type.
    pub fn recent_recovery_points(
        &self,
        filter: Option<SnapshotType>,
        max: usize,
    ) -> Vec<RecoveryPoint> {
        recent(&self.points, filter, max).into_iter().cloned().collect()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn record_activity(&mut self) {
        self.last_activity = self.clock.now();
    }

    /// Tracks visibility. Becoming visible records "Tab resumed".
    pub fn set_visible(&mut self, visible: bool) -> Option<String> {
        self.visible = visible;
        self.record_activity();
        if visible {
            self.checkpoint_quietly(TAB_RESUMED)
        } else {
            None
        }
    }

    /// Timer tick. Checkpoints only a visible window whose user was active
    /// within the idle threshold.
    pub fn autosave_tick(&mut self) -> Option<String> {
        let idle_for = self.clock.now() - self.last_activity;
        if idle_for > self.config.idle_threshold() {
            tracing::debug!(
                session_id = %self.session_id,
                idle_secs = idle_for.num_seconds(),
                "[SessionManager] Auto-save skipped: idle"
            );
            return None;
        }
        if !self.visible {
            tracing::debug!(
                session_id = %self.session_id,
                "[SessionManager] Auto-save skipped: hidden"
            );
            return None;
        }
        self.checkpoint_quietly(AUTO_SAVED)
    }

    /// Records "Window closing". Completes before returning.
    pub fn unload(&mut self) -> Option<String> {
        self.checkpoint_quietly(WINDOW_CLOSING)
    }

    /// Captures the current state and appends a recovery point for it.
    ///
    /// Fails only if the snapshot payload cannot be written. The point list
    /// is persisted and broadcast on a best-effort basis.
    pub fn create_recovery_point(
        &mut self,
        description: &str,
        snapshot_type: SnapshotType,
        operation_context: Option<Value>,
    ) -> Result<String> {
        let timestamp = self.clock.now();
        let id = Uuid::new_v4().to_string();
        let state_key = keys::snapshot_key(&self.session_id, timestamp, &id[..8]);

        let snapshot = collect_app_state(self.store.as_ref());
        self.store
            .set_sync(&state_key, &StateEnvelope::snapshot(snapshot))?;

        let point = RecoveryPoint {
            id: id.clone(),
            timestamp,
            description: description.to_string(),
            state_key,
            snapshot_type,
            operation_context,
        };

        merge_point(&mut self.points, point.clone());
        let evicted = enforce_limit(&mut self.points, self.config.max_recovery_points);
        self.persist_points();

        tracing::debug!(
            session_id = %self.session_id,
            recovery_point_id = %id,
            snapshot_type = snapshot_type.as_str(),
            evicted = evicted.len(),
            "[SessionManager] Recovery point created"
        );

        self.broadcast(point);
        Ok(id)
    }

    fn checkpoint_quietly(&mut self, description: &str) -> Option<String> {
        match self.create_recovery_point(description, SnapshotType::Auto, None) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    description,
                    error = %e,
                    "[SessionManager] Failed to create recovery point"
                );
                None
            }
        }
    }

    fn broadcast(&self, point: RecoveryPoint) {
        if let Some(sender) = &self.sync {
            // No other window listening is not an error.
            let _ = sender.send(SyncMessage::recovery_point_created(point, &self.window_id));
        }
    }

    fn persist_points(&self) {
        let key = keys::recovery_points_key(&self.session_id);
        if let Err(e) = self.store.set_sync(&key, &self.points) {
            tracing::error!(
                session_id = %self.session_id,
                error = %e,
                "[SessionManager] Failed to persist recovery point list"
            );
        }
    }

    /// Merges a point announced by another window. Returns whether the
    /// local list changed.
    pub fn receive(&mut self, message: SyncMessage) -> bool {
        if message.origin == self.window_id {
            return false;
        }
        let id = message.data.id.clone();
        if !merge_point(&mut self.points, message.data) {
            return false;
        }
        let evicted = enforce_limit(&mut self.points, self.config.max_recovery_points);
        self.persist_points();

        tracing::debug!(
            session_id = %self.session_id,
            recovery_point_id = %id,
            origin = %message.origin,
            "[SessionManager] Merged remote recovery point"
        );
        !(evicted.len() == 1 && evicted[0].id == id)
    }

    /// Rehydrates the store from a recovery point and resets the runtime.
    ///
    /// Returns `false` without writing anything if the point is unknown or
    /// its snapshot cannot be read.
    pub fn restore_from_recovery_point(&mut self, recovery_point_id: &str) -> bool {
        let Some(point) = self
            .points
            .iter()
            .find(|p| p.id == recovery_point_id)
            .cloned()
        else {
            tracing::warn!(
                session_id = %self.session_id,
                recovery_point_id,
                "[SessionManager] Recovery point not found"
            );
            return false;
        };

        let plan = match self.plan_restore(&point) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id,
                    recovery_point_id,
                    error = %e,
                    "[SessionManager] Cannot read recovery point snapshot"
                );
                return false;
            }
        };

        if let Err(e) = plan.apply(self.store.as_ref()) {
            tracing::error!(
                session_id = %self.session_id,
                recovery_point_id,
                error = %e,
                "[SessionManager] Restore write failed"
            );
            return false;
        }

        let context = json!({
            "restoredFrom": point.id,
            "originalTimestamp": point.timestamp,
        });
        if let Err(e) = self.create_recovery_point(
            &format!("Restored from: {}", point.description),
            SnapshotType::Auto,
            Some(context),
        ) {
            tracing::error!(
                session_id = %self.session_id,
                error = %e,
                "[SessionManager] Failed to record restore"
            );
        }

        tracing::info!(
            session_id = %self.session_id,
            recovery_point_id,
            writes = plan.writes().len(),
            "[SessionManager] Restored"
        );
        self.reset.reset();
        true
    }

    fn plan_restore(&self, point: &RecoveryPoint) -> Result<RestorePlan> {
        let envelope: StateEnvelope = self
            .store
            .try_get_sync(&point.state_key)?
            .ok_or_else(|| WaypointError::not_found("Snapshot", &point.state_key))?;
        envelope.ensure_supported()?;
        let snapshot = envelope.as_snapshot().ok_or_else(|| {
            WaypointError::invalid_state(format!("'{}' does not hold a snapshot", point.state_key))
        })?;
        let existing = self.store.keys_sync()?;
        Ok(RestorePlan::build(snapshot, &existing))
    }

    /// Stores caller-named session state.
    pub fn save_session_state<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.store
            .set_sync(&keys::session_state_key(&self.session_id, key), value)
            .inspect_err(|e| {
                tracing::error!(
                    session_id = %self.session_id,
                    key,
                    error = %e,
                    "[SessionManager] Failed to save session state"
                );
            })
    }

    /// Reads caller-named session state, `default` when absent or unreadable.
    pub fn get_session_state<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.store
            .get_sync(&keys::session_state_key(&self.session_id, key), default)
    }

    /// Drops points of one type, or all of them.
    pub fn clear_recovery_points(&mut self, filter: Option<SnapshotType>) {
        let before = self.points.len();
        match filter {
            Some(kind) => self.points.retain(|p| p.snapshot_type != kind),
            None => self.points.clear(),
        }
        self.persist_points();
        tracing::info!(
            session_id = %self.session_id,
            cleared = before - self.points.len(),
            "[SessionManager] Recovery points cleared"
        );
    }
}

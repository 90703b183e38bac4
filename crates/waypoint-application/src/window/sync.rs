//! Cross-window checkpoint notifications.
//!
//! Windows sharing a session id share one broadcast channel. Delivery is
//! best effort: a window that lags behind skips messages and a window that
//! is not listening misses them. Each receiver de-duplicates by point id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use waypoint_core::checkpoint::RecoveryPoint;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEventType {
    RecoveryPointCreated,
}

/// One message on a session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub event_type: SyncEventType,
    pub timestamp: DateTime<Utc>,
    pub data: RecoveryPoint,
    /// Window that created the point.
    pub origin: String,
}

impl SyncMessage {
    pub fn recovery_point_created(point: RecoveryPoint, origin: impl Into<String>) -> Self {
        Self {
            event_type: SyncEventType::RecoveryPointCreated,
            timestamp: point.timestamp,
            data: point,
            origin: origin.into(),
        }
    }
}

/// Registry of per-session broadcast channels.
#[derive(Debug, Default)]
pub struct SyncHub {
    channels: Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>,
}

impl SyncHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender and a fresh receiver for `session_id`, creating the channel on
    /// first use. Channels nobody listens to any more are dropped first.
    pub fn join(
        &self,
        session_id: &str,
    ) -> (broadcast::Sender<SyncMessage>, broadcast::Receiver<SyncMessage>) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        prune_idle(&mut channels);
        let sender = channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        let receiver = sender.subscribe();
        (sender, receiver)
    }

    /// Number of live receivers on a session channel.
    pub fn listeners(&self, session_id: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(session_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Drops every channel without receivers.
    pub fn prune(&self) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        prune_idle(&mut channels);
    }

    /// Number of session channels currently registered.
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

fn prune_idle(channels: &mut HashMap<String, broadcast::Sender<SyncMessage>>) {
    channels.retain(|session_id, sender| {
        let live = sender.receiver_count() > 0;
        if !live {
            tracing::debug!(session_id = %session_id, "[SyncHub] Dropping idle channel");
        }
        live
    });
}

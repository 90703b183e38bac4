//! Auto-save controller: the window event loop.
//!
//! One task owns the [`SessionManager`] and serializes window events, timer
//! ticks, debounced checkpoints and sync messages through a single
//! `select!` loop. Callers talk to it through a cloneable [`SessionHandle`].

use super::manager::SessionManager;
use super::sync::{SyncHub, SyncMessage};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use waypoint_core::checkpoint::{RecoveryPoint, SnapshotType};
use waypoint_core::config::AutoSaveConfig;
use waypoint_core::error::{Result, WaypointError};

const COMMAND_BUFFER: usize = 64;

enum Command {
    Activity,
    Visibility(bool),
    Checkpoint {
        description: String,
        snapshot_type: SnapshotType,
        context: Option<Value>,
        reply: oneshot::Sender<Result<String>>,
    },
    CheckpointDebounced {
        description: String,
        context: Option<Value>,
    },
    Restore {
        recovery_point_id: String,
        reply: oneshot::Sender<bool>,
    },
    SaveState {
        key: String,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    GetState {
        key: String,
        reply: oneshot::Sender<Option<Value>>,
    },
    Clear {
        filter: Option<SnapshotType>,
        reply: oneshot::Sender<()>,
    },
    Points {
        reply: oneshot::Sender<Vec<RecoveryPoint>>,
    },
    Unload {
        reply: oneshot::Sender<Option<String>>,
    },
}

struct PendingCheckpoint {
    deadline: Instant,
    description: String,
    context: Option<Value>,
}

/// Cloneable handle to a running window.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    window_id: String,
    commands: mpsc::Sender<Command>,
}

/// Spawns window event loops.
pub struct AutoSaveController;

impl AutoSaveController {
    /// Mounts `manager`, joins its session channel on `hub` and runs the
    /// event loop until [`SessionHandle::unload`] or every handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        mut manager: SessionManager,
        hub: Option<&SyncHub>,
        config: &AutoSaveConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let sync_rx = hub.map(|hub| {
            let (sender, receiver) = hub.join(manager.session_id());
            manager.connect(sender);
            receiver
        });
        manager.mount();

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            session_id: manager.session_id().to_string(),
            window_id: manager.window_id().to_string(),
            commands: tx,
        };
        let task = tokio::spawn(run(
            manager,
            rx,
            sync_rx,
            config.interval(),
            config.checkpoint_debounce(),
        ));
        (handle, task)
    }
}

async fn next_sync(
    receiver: &mut Option<broadcast::Receiver<SyncMessage>>,
) -> std::result::Result<SyncMessage, broadcast::error::RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn debounce_elapsed(pending: &Option<PendingCheckpoint>) {
    match pending {
        Some(pending) => tokio::time::sleep_until(pending.deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(
    mut manager: SessionManager,
    mut commands: mpsc::Receiver<Command>,
    mut sync_rx: Option<broadcast::Receiver<SyncMessage>>,
    period: std::time::Duration,
    debounce: std::time::Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<PendingCheckpoint> = None;

    tracing::info!(
        session_id = %manager.session_id(),
        window_id = %manager.window_id(),
        interval_secs = period.as_secs(),
        "[AutoSaveController] Event loop started"
    );

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    // Every handle is gone; treat it as the window closing.
                    manager.unload();
                    break;
                };
                match command {
                    Command::Activity => manager.record_activity(),
                    Command::Visibility(visible) => {
                        manager.set_visible(visible);
                    }
                    Command::Checkpoint { description, snapshot_type, context, reply } => {
                        let _ = reply.send(manager.create_recovery_point(&description, snapshot_type, context));
                    }
                    Command::CheckpointDebounced { description, context } => {
                        pending = Some(PendingCheckpoint {
                            deadline: Instant::now() + debounce,
                            description,
                            context,
                        });
                    }
                    Command::Restore { recovery_point_id, reply } => {
                        let _ = reply.send(manager.restore_from_recovery_point(&recovery_point_id));
                    }
                    Command::SaveState { key, value, reply } => {
                        let _ = reply.send(manager.save_session_state(&key, &value));
                    }
                    Command::GetState { key, reply } => {
                        let value: Option<Value> = manager.get_session_state(&key, None);
                        let _ = reply.send(value);
                    }
                    Command::Clear { filter, reply } => {
                        manager.clear_recovery_points(filter);
                        let _ = reply.send(());
                    }
                    Command::Points { reply } => {
                        let _ = reply.send(manager.recovery_points().to_vec());
                    }
                    Command::Unload { reply } => {
                        let _ = reply.send(manager.unload());
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                manager.autosave_tick();
            }
            _ = debounce_elapsed(&pending) => {
                if let Some(fire) = pending.take() {
                    if let Err(e) = manager.create_recovery_point(
                        &fire.description,
                        SnapshotType::Auto,
                        fire.context,
                    ) {
                        tracing::error!(
                            session_id = %manager.session_id(),
                            error = %e,
                            "[AutoSaveController] Debounced checkpoint failed"
                        );
                    }
                }
            }
            message = next_sync(&mut sync_rx) => {
                match message {
                    Ok(message) => {
                        manager.receive(message);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            session_id = %manager.session_id(),
                            skipped,
                            "[AutoSaveController] Sync receiver lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        sync_rx = None;
                    }
                }
            }
        }
    }

    tracing::info!(
        session_id = %manager.session_id(),
        window_id = %manager.window_id(),
        "[AutoSaveController] Event loop stopped"
    );
}

fn closed() -> WaypointError {
    WaypointError::internal("window event loop has stopped")
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| closed())?;
        response.await.map_err(|_| closed())
    }

    /// Any user input: pointer, key, scroll or touch.
    pub async fn record_activity(&self) -> Result<()> {
        self.commands
            .send(Command::Activity)
            .await
            .map_err(|_| closed())
    }

    pub async fn set_visible(&self, visible: bool) -> Result<()> {
        self.commands
            .send(Command::Visibility(visible))
            .await
            .map_err(|_| closed())
    }

    /// Creates a recovery point now.
    pub async fn create_recovery_point(
        &self,
        description: impl Into<String>,
        snapshot_type: SnapshotType,
        context: Option<Value>,
    ) -> Result<String> {
        let description = description.into();
        self.request(|reply| Command::Checkpoint {
            description,
            snapshot_type,
            context,
            reply,
        })
        .await?
    }

    /// A point the user explicitly asked for. Never evicted while auto
    /// points remain.
    pub async fn create_manual_recovery_point(
        &self,
        description: impl Into<String>,
        context: Option<Value>,
    ) -> Result<String> {
        self.create_recovery_point(description, SnapshotType::Manual, context)
            .await
    }

    /// Schedules an auto point after the debounce window. A later call
    /// before the window elapses replaces this one. Never waits, so it can
    /// be called from synchronous code.
    pub fn create_debounced_recovery_point(
        &self,
        description: impl Into<String>,
        context: Option<Value>,
    ) -> Result<()> {
        self.commands
            .try_send(Command::CheckpointDebounced {
                description: description.into(),
                context,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    WaypointError::storage("checkpoint", "window command queue is full")
                }
                mpsc::error::TrySendError::Closed(_) => closed(),
            })
    }

    pub async fn restore_from_recovery_point(&self, recovery_point_id: impl Into<String>) -> Result<bool> {
        let recovery_point_id = recovery_point_id.into();
        self.request(|reply| Command::Restore {
            recovery_point_id,
            reply,
        })
        .await
    }

    pub async fn save_session_state(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        self.request(|reply| Command::SaveState { key, value, reply })
            .await?
    }

    pub async fn get_session_state(&self, key: impl Into<String>) -> Result<Option<Value>> {
        let key = key.into();
        self.request(|reply| Command::GetState { key, reply }).await
    }

    pub async fn clear_recovery_points(&self, filter: Option<SnapshotType>) -> Result<()> {
        self.request(|reply| Command::Clear { filter, reply }).await
    }

    pub async fn recovery_points(&self) -> Result<Vec<RecoveryPoint>> {
        self.request(|reply| Command::Points { reply }).await
    }

    /// Records "Window closing" and stops the event loop.
    pub async fn unload(&self) -> Result<Option<String>> {
        self.request(|reply| Command::Unload { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::CountingReset;
    use crate::window::manager::{AUTO_SAVED, SESSION_STARTED, WINDOW_CLOSING};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use waypoint_core::clock::SystemClock;
    use waypoint_core::state::SyncStateStoreExt;
    use waypoint_infrastructure::MemoryStore;

    fn manager(store: Arc<MemoryStore>, session: &str) -> SessionManager {
        SessionManager::new(
            Some(session.to_string()),
            store,
            Arc::new(SystemClock),
            Arc::new(CountingReset::new()),
            AutoSaveConfig::default(),
        )
    }

    fn fast_config() -> AutoSaveConfig {
        AutoSaveConfig {
            interval_secs: 300,
            checkpoint_debounce_ms: 1000,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_checkpoints_and_unload() {
        let store = Arc::new(MemoryStore::new());
        let (handle, task) =
            AutoSaveController::spawn(manager(store.clone(), "s-1"), None, &fast_config());

        tokio::time::sleep(Duration::from_secs(301)).await;
        let points = handle.recovery_points().await.unwrap();
        let descriptions: Vec<&str> = points.iter().map(|p| p.description.as_str()).collect();
        assert_eq!(descriptions, [SESSION_STARTED, AUTO_SAVED]);

        assert!(handle.unload().await.unwrap().is_some());
        task.await.unwrap();
        assert!(handle.record_activity().await.is_err());

        let persisted: Vec<RecoveryPoint> = store
            .get_sync(&waypoint_core::keys::recovery_points_key("s-1"), Vec::new());
        assert_eq!(persisted.last().unwrap().description, WINDOW_CLOSING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_checkpoints_collapse() {
        let store = Arc::new(MemoryStore::new());
        let (handle, _task) =
            AutoSaveController::spawn(manager(store, "s-1"), None, &fast_config());

        handle
            .create_debounced_recovery_point("Form state: a", Some(json!({"n": 1})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle
            .create_debounced_recovery_point("Form state: a", Some(json!({"n": 2})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let points = handle.recovery_points().await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].operation_context, Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_windows_share_points_through_hub() {
        let hub = SyncHub::new();
        let (a, _ta) = AutoSaveController::spawn(
            manager(Arc::new(MemoryStore::new()), "shared"),
            Some(&hub),
            &fast_config(),
        );
        let (b, _tb) = AutoSaveController::spawn(
            manager(Arc::new(MemoryStore::new()), "shared"),
            Some(&hub),
            &fast_config(),
        );

        let id = a
            .create_manual_recovery_point("Checkpoint A", None)
            .await
            .unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if b.recovery_points().await.unwrap().iter().any(|p| p.id == id) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen, "window b never saw {id}");
    }

    #[tokio::test]
    async fn test_session_state_through_handle() {
        let (handle, _task) = AutoSaveController::spawn(
            manager(Arc::new(MemoryStore::new()), "s-1"),
            None,
            &fast_config(),
        );
        handle
            .save_session_state("form:draft", json!({"title": "x"}))
            .await
            .unwrap();
        assert_eq!(
            handle.get_session_state("form:draft").await.unwrap(),
            Some(json!({"title": "x"}))
        );
        assert_eq!(handle.get_session_state("missing").await.unwrap(), None);
    }
}

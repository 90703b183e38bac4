//! AsyncDirStorage-based SessionRepository implementation
//!
//! Directory structure:
//! ```text
//! data_dir/
//! └── sessions/
//!     ├── 3f2a9c4e-....json
//!     └── 8b1d07aa-....json
//! ```

use crate::dto::create_session_migrator;
use crate::paths::WaypointPaths;
use crate::storage_repository::{is_not_found, is_safe_id, open_dir_storage};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use version_migrate::AsyncDirStorage;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::session::{Session, SessionRepository};

const ENTITY_NAME: &str = "session";
const DOMAIN: &str = "sessions";

/// Sessions as versioned JSON documents.
///
/// Writes are serialized through one async mutex, which makes the revision
/// check-and-set in [`SessionRepository::update`] atomic within a process.
pub struct FileSessionRepository {
    storage: AsyncDirStorage,
    write_lock: Mutex<()>,
}

impl FileSessionRepository {
    pub async fn new(paths: &WaypointPaths) -> Result<Self> {
        Self::at(paths.data_dir()).await
    }

    /// Keeps sessions under `base_dir/sessions`.
    pub async fn at(base_dir: impl AsRef<Path>) -> Result<Self> {
        let storage =
            open_dir_storage(base_dir.as_ref(), DOMAIN, create_session_migrator()).await?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }

    pub fn sessions_dir(&self) -> &Path {
        self.storage.base_path()
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        if !is_safe_id(session_id) {
            return Ok(None);
        }
        match self.storage.load::<Session>(ENTITY_NAME, session_id).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(WaypointError::storage(
                "load",
                format!("session '{session_id}': {e}"),
            )),
        }
    }

    async fn save(&self, session: &Session) -> Result<()> {
        if !is_safe_id(&session.id) {
            return Err(WaypointError::storage(
                "save",
                format!("session id '{}' is not a valid file name", session.id),
            ));
        }
        self.storage
            .save(ENTITY_NAME, &session.id, session)
            .await
            .map_err(|e| WaypointError::storage("save", format!("session '{}': {}", session.id, e)))
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        self.load(session_id).await
    }

    async fn create(&self, session: &Session) -> Result<Session> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.load(&session.id).await? {
            return Err(WaypointError::Conflict {
                entity_type: "Session",
                id: session.id.clone(),
                expected: 0,
                actual: existing.revision,
            });
        }

        let mut stored = session.clone();
        stored.revision = 0;
        self.save(&stored).await?;
        Ok(stored)
    }

    async fn update(&self, session: &Session, expected_revision: u64) -> Result<Session> {
        let _guard = self.write_lock.lock().await;

        let current = self
            .load(&session.id)
            .await?
            .ok_or_else(|| WaypointError::not_found("Session", &session.id))?;

        if current.revision != expected_revision {
            tracing::debug!(
                session_id = %session.id,
                expected = expected_revision,
                actual = current.revision,
                "[FileSessionRepository] Revision mismatch"
            );
            return Err(WaypointError::Conflict {
                entity_type: "Session",
                id: session.id.clone(),
                expected: expected_revision,
                actual: current.revision,
            });
        }

        let mut stored = session.clone();
        stored.revision = expected_revision + 1;
        self.save(&stored).await?;
        Ok(stored)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        let all_sessions = self
            .storage
            .load_all::<Session>(ENTITY_NAME)
            .await
            .map_err(|e| WaypointError::storage("list", format!("sessions: {e}")))?;

        let mut sessions: Vec<Session> = all_sessions
            .into_iter()
            .map(|(_, session)| session)
            .filter(|s| s.owner_id == owner_id)
            .collect();

        // Most recently started first
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;
    use waypoint_core::session::{DeviceInfo, SessionRefs, SessionStatus};

    async fn create_test_repository() -> (FileSessionRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileSessionRepository::at(temp_dir.path()).await.unwrap();
        (repo, temp_dir)
    }

    fn create_test_session(id: &str, owner: &str) -> Session {
        let now = Utc::now();
        Session::start(
            id,
            owner,
            SessionRefs {
                workspace: Some("W1".to_string()),
                ..Default::default()
            },
            DeviceInfo {
                window_id: Some("w-1".to_string()),
                user_agent: None,
                platform: None,
                ip_address: None,
                last_active_at: now,
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (repo, _dir) = create_test_repository().await;
        let session = create_test_session("s-1", "u-1");

        repo.create(&session).await.unwrap();
        let found = repo.find_by_id("s-1").await.unwrap().unwrap();
        assert_eq!(found, session);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
        assert!(repo.find_by_id("../escape").await.unwrap().is_none());
        assert!(repo.sessions_dir().join("s-1.json").exists());
    }

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let (repo, dir) = create_test_repository().await;
        let created = repo.create(&create_test_session("s-1", "u-1")).await.unwrap();
        let updated = repo.update(&created, 0).await.unwrap();
        drop(repo);

        let reopened = FileSessionRepository::at(dir.path()).await.unwrap();
        assert_eq!(reopened.find_by_id("s-1").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let (repo, _dir) = create_test_repository().await;
        let session = create_test_session("s-1", "u-1");
        repo.create(&session).await.unwrap();
        assert!(repo.create(&session).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_revision_and_rejects_stale() {
        let (repo, _dir) = create_test_repository().await;
        let session = repo.create(&create_test_session("s-1", "u-1")).await.unwrap();

        let mut paused = session.clone();
        paused.status = SessionStatus::Paused;
        let stored = repo.update(&paused, 0).await.unwrap();
        assert_eq!(stored.revision, 1);

        let stale = repo.update(&session, 0).await.unwrap_err();
        assert_eq!(stale.status_code(), 409);

        let reloaded = repo.find_by_id("s-1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Paused);
        assert_eq!(reloaded.revision, 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (repo, _dir) = create_test_repository().await;
        let err = repo
            .update(&create_test_session("nope", "u-1"), 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_single_winner() {
        let (repo, _dir) = create_test_repository().await;
        let repo = Arc::new(repo);
        let session = repo.create(&create_test_session("s-1", "u-1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move { repo.update(&session, 0).await }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert!(e.is_conflict()),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_find_by_owner_sorted() {
        let (repo, _dir) = create_test_repository().await;
        let mut older = create_test_session("s-old", "u-1");
        older.started_at = older.started_at - Duration::hours(1);
        repo.create(&older).await.unwrap();
        repo.create(&create_test_session("s-new", "u-1")).await.unwrap();
        repo.create(&create_test_session("s-other", "u-2")).await.unwrap();

        let ids: Vec<String> = repo
            .find_by_owner("u-1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s-new".to_string(), "s-old".to_string()]);
    }
}

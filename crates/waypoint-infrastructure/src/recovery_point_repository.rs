//! AsyncDirStorage-based RecoveryPointRepository implementation
//!
//! Directory structure:
//! ```text
//! data_dir/
//! └── recovery_points/
//!     ├── 0c9e....json
//!     └── 5d21....json
//! ```

use crate::dto::create_recovery_point_migrator;
use crate::paths::WaypointPaths;
use crate::storage_repository::{is_not_found, is_safe_id, open_dir_storage};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use version_migrate::AsyncDirStorage;
use waypoint_core::checkpoint::{RecoveryPointRepository, StoredRecoveryPoint};
use waypoint_core::error::{Result, WaypointError};

const ENTITY_NAME: &str = "recovery_point";
const DOMAIN: &str = "recovery_points";

pub struct FileRecoveryPointRepository {
    storage: AsyncDirStorage,
    write_lock: Mutex<()>,
}

impl FileRecoveryPointRepository {
    pub async fn new(paths: &WaypointPaths) -> Result<Self> {
        Self::at(paths.data_dir()).await
    }

    /// Keeps points under `base_dir/recovery_points`.
    pub async fn at(base_dir: impl AsRef<Path>) -> Result<Self> {
        let storage =
            open_dir_storage(base_dir.as_ref(), DOMAIN, create_recovery_point_migrator()).await?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
        })
    }

    pub fn recovery_points_dir(&self) -> &Path {
        self.storage.base_path()
    }

    async fn load(&self, id: &str) -> Result<Option<StoredRecoveryPoint>> {
        if !is_safe_id(id) {
            return Ok(None);
        }
        match self.storage.load::<StoredRecoveryPoint>(ENTITY_NAME, id).await {
            Ok(point) => Ok(Some(point)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(WaypointError::storage(
                "load",
                format!("recovery point '{id}': {e}"),
            )),
        }
    }

    async fn load_sorted<F>(&self, keep: F) -> Result<Vec<StoredRecoveryPoint>>
    where
        F: Fn(&StoredRecoveryPoint) -> bool,
    {
        let all_points = self
            .storage
            .load_all::<StoredRecoveryPoint>(ENTITY_NAME)
            .await
            .map_err(|e| WaypointError::storage("list", format!("recovery points: {e}")))?;

        let mut points: Vec<StoredRecoveryPoint> = all_points
            .into_iter()
            .map(|(_, point)| point)
            .filter(|p| keep(p))
            .collect();
        points.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(points)
    }
}

#[async_trait]
impl RecoveryPointRepository for FileRecoveryPointRepository {
    async fn create(&self, point: &StoredRecoveryPoint) -> Result<()> {
        if !is_safe_id(&point.id) {
            return Err(WaypointError::storage(
                "save",
                format!("recovery point id '{}' is not a valid file name", point.id),
            ));
        }

        let _guard = self.write_lock.lock().await;

        if self.load(&point.id).await?.is_some() {
            return Err(WaypointError::Conflict {
                entity_type: "RecoveryPoint",
                id: point.id.clone(),
                expected: 0,
                actual: 0,
            });
        }
        self.storage
            .save(ENTITY_NAME, &point.id, point)
            .await
            .map_err(|e| {
                WaypointError::storage("save", format!("recovery point '{}': {}", point.id, e))
            })
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredRecoveryPoint>> {
        self.load(id).await
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<StoredRecoveryPoint>> {
        self.load_sorted(|p| p.session_id.as_deref() == Some(session_id))
            .await
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<StoredRecoveryPoint>> {
        self.load_sorted(|p| p.owner_id == owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;
    use waypoint_core::checkpoint::{RecoveryKind, tags};
    use waypoint_core::session::SessionRefs;
    use waypoint_core::state::{AppSnapshot, StateEnvelope};

    fn create_test_point(id: &str, session: Option<&str>, offset_secs: i64) -> StoredRecoveryPoint {
        let created_at = Utc::now() + Duration::seconds(offset_secs);
        let mut point = StoredRecoveryPoint {
            id: id.to_string(),
            owner_id: "u-1".to_string(),
            session_id: session.map(str::to_string),
            description: Some("Session started".to_string()),
            refs: SessionRefs::default(),
            kind: RecoveryKind::Auto,
            state: StateEnvelope::snapshot(AppSnapshot {
                tasks: Some(vec![json!({"id": "t1"})]),
                ..Default::default()
            }),
            device_info: None,
            tags: vec![tags::SESSION_START.to_string()],
            metadata: None,
            created_at,
            expires_at: None,
            is_archived: false,
        };
        point.apply_retention(Duration::days(14));
        point
    }

    #[tokio::test]
    async fn test_roundtrip_and_queries() {
        let dir = TempDir::new().unwrap();
        let repo = FileRecoveryPointRepository::at(dir.path()).await.unwrap();

        let late = create_test_point("rp-2", Some("s-1"), 10);
        let early = create_test_point("rp-1", Some("s-1"), 0);
        let loose = create_test_point("rp-3", None, 5);
        repo.create(&late).await.unwrap();
        repo.create(&early).await.unwrap();
        repo.create(&loose).await.unwrap();

        assert_eq!(repo.find_by_id("rp-1").await.unwrap(), Some(early.clone()));

        let by_session: Vec<String> = repo
            .find_by_session("s-1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(by_session, vec!["rp-1".to_string(), "rp-2".to_string()]);
        assert_eq!(repo.find_by_owner("u-1").await.unwrap().len(), 3);
        assert!(repo.find_by_owner("u-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_points_are_immutable() {
        let dir = TempDir::new().unwrap();
        let repo = FileRecoveryPointRepository::at(dir.path()).await.unwrap();
        let point = create_test_point("rp-1", None, 0);
        repo.create(&point).await.unwrap();
        assert!(repo.recovery_points_dir().join("rp-1.json").exists());
        assert!(repo.create(&point).await.unwrap_err().is_conflict());
    }
}

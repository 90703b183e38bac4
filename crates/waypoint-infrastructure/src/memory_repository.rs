//! In-memory repositories, for tests and ephemeral servers.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use waypoint_core::checkpoint::{RecoveryPointRepository, StoredRecoveryPoint};
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::session::{Session, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn create(&self, session: &Session) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.id) {
            return Err(WaypointError::Conflict {
                entity_type: "Session",
                id: session.id.clone(),
                expected: 0,
                actual: existing.revision,
            });
        }
        let mut stored = session.clone();
        stored.revision = 0;
        sessions.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, session: &Session, expected_revision: u64) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        let current = sessions
            .get(&session.id)
            .ok_or_else(|| WaypointError::not_found("Session", &session.id))?;
        if current.revision != expected_revision {
            return Err(WaypointError::Conflict {
                entity_type: "Session",
                id: session.id.clone(),
                expected: expected_revision,
                actual: current.revision,
            });
        }
        let mut stored = session.clone();
        stored.revision = expected_revision + 1;
        sessions.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

#[derive(Default)]
pub struct InMemoryRecoveryPointRepository {
    points: RwLock<Vec<StoredRecoveryPoint>>,
}

impl InMemoryRecoveryPointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    /// Everything stored, in creation order.
    pub async fn all(&self) -> Vec<StoredRecoveryPoint> {
        self.points.read().await.clone()
    }
}

#[async_trait]
impl RecoveryPointRepository for InMemoryRecoveryPointRepository {
    async fn create(&self, point: &StoredRecoveryPoint) -> Result<()> {
        let mut points = self.points.write().await;
        if points.iter().any(|p| p.id == point.id) {
            return Err(WaypointError::Conflict {
                entity_type: "RecoveryPoint",
                id: point.id.clone(),
                expected: 0,
                actual: 0,
            });
        }
        points.push(point.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StoredRecoveryPoint>> {
        Ok(self.points.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<StoredRecoveryPoint>> {
        Ok(self
            .points
            .read()
            .await
            .iter()
            .filter(|p| p.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect())
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<StoredRecoveryPoint>> {
        Ok(self
            .points
            .read()
            .await
            .iter()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

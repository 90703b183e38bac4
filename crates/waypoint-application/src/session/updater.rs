//! Session updater helper for common update patterns.
//!
//! This module provides `SessionUpdater` which abstracts the
//! "find → check owner → update → save with revision" pattern shared by every
//! lifecycle transition.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::session::{Session, SessionRepository, SessionStatus};

/// Helper struct for updating sessions with a common pattern.
///
/// `SessionUpdater` encapsulates:
/// 1. Loading a session from storage
/// 2. Checking the caller owns it
/// 3. Applying read-time expiry derivation
/// 4. Applying updates
/// 5. Saving back with the revision that was read
///
/// A concurrent writer that got there first turns step 5 into a `Conflict`.
pub struct SessionUpdater {
    repository: Arc<dyn SessionRepository>,
    idle_expiry: Duration,
}

impl SessionUpdater {
    /// Creates a new `SessionUpdater` with the given repository.
    pub fn new(repository: Arc<dyn SessionRepository>, idle_expiry: Duration) -> Self {
        Self {
            repository,
            idle_expiry,
        }
    }

    /// Loads a session owned by `user_id`, with derivation applied at `now`.
    pub async fn load_owned(&self, session_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<Session> {
        let stored = self
            .repository
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| WaypointError::not_found("Session", session_id))?;

        if !stored.is_owned_by(user_id) {
            tracing::warn!(
                session_id = %session_id,
                "[SessionUpdater] Caller does not own session"
            );
            return Err(WaypointError::forbidden(format!(
                "session '{session_id}' belongs to another user"
            )));
        }

        Ok(stored.observed(now, self.idle_expiry))
    }

    /// Updates a session by applying the given updater function.
    ///
    /// The updater sees the observed session, so `status` may read
    /// `Expired`. If the updater leaves it that way the stored status is put
    /// back before saving, since expiry is never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session doesn't exist
    /// - The caller is not the owner
    /// - The updater function returns an error
    /// - Another writer updated the session since it was read
    /// - Saving to storage fails
    pub async fn update<F, T>(
        &self,
        session_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
        updater: F,
    ) -> Result<(Session, T)>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        tracing::debug!(session_id = %session_id, "[SessionUpdater] update() called");

        let stored = self
            .repository
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| WaypointError::not_found("Session", session_id))?;

        if !stored.is_owned_by(user_id) {
            tracing::warn!(
                session_id = %session_id,
                "[SessionUpdater] Caller does not own session"
            );
            return Err(WaypointError::forbidden(format!(
                "session '{session_id}' belongs to another user"
            )));
        }

        let expected_revision = stored.revision;
        let stored_status = stored.status;
        let mut session = stored.observed(now, self.idle_expiry);

        let output = updater(&mut session)?;

        if session.status == SessionStatus::Expired {
            session.status = stored_status;
        }

        tracing::debug!(
            session_id = %session.id,
            status = %session.status,
            revision = expected_revision,
            "[SessionUpdater] Saving session"
        );
        let saved = self.repository.update(&session, expected_revision).await?;

        Ok((saved, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::session::{DeviceInfo, SessionRefs};
    use waypoint_infrastructure::InMemorySessionRepository;

    fn device(now: DateTime<Utc>) -> DeviceInfo {
        DeviceInfo {
            window_id: None,
            user_agent: None,
            platform: None,
            ip_address: None,
            last_active_at: now,
        }
    }

    async fn seeded(now: DateTime<Utc>) -> (Arc<InMemorySessionRepository>, SessionUpdater) {
        let repo = Arc::new(InMemorySessionRepository::new());
        repo.create(&Session::start("s-1", "u-1", SessionRefs::default(), device(now), now))
            .await
            .unwrap();
        let updater = SessionUpdater::new(repo.clone(), Duration::minutes(15));
        (repo, updater)
    }

    #[tokio::test]
    async fn test_update_saves_with_bumped_revision() {
        let now = Utc::now();
        let (repo, updater) = seeded(now).await;

        let (saved, closed) = updater
            .update("s-1", "u-1", now, |s| Ok(s.close_open_entries(now)))
            .await
            .unwrap();
        assert_eq!(closed, 1);
        assert_eq!(saved.revision, 1);
        assert_eq!(repo.find_by_id("s-1").await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_other_owner() {
        let now = Utc::now();
        let (_repo, updater) = seeded(now).await;
        let err = updater.update("s-1", "u-2", now, |_| Ok(())).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_expired_status_is_never_persisted() {
        let now = Utc::now();
        let (repo, updater) = seeded(now).await;
        let later = now + Duration::minutes(30);

        let (_, seen) = updater
            .update("s-1", "u-1", later, |s| Ok(s.status))
            .await
            .unwrap();
        assert_eq!(seen, SessionStatus::Expired);
        let stored = repo.find_by_id("s-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let now = Utc::now();
        let (_repo, updater) = seeded(now).await;
        assert!(updater.update("nope", "u-1", now, |_| Ok(())).await.unwrap_err().is_not_found());
        assert!(updater.load_owned("nope", "u-1", now).await.unwrap_err().is_not_found());
    }
}

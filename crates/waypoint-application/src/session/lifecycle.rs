//! Server-side session lifecycle.
//!
//! Every operation follows the same shape: resolve the caller, load and
//! authorize the session, apply the transition, persist it with a revision
//! check, then record an auto recovery point describing what happened.

use super::updater::SessionUpdater;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use waypoint_core::checkpoint::{RecoveryKind, RecoveryPointRepository, StoredRecoveryPoint, tags};
use waypoint_core::clock::{Clock, minutes_between};
use waypoint_core::config::SessionConfig;
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::request::RequestContext;
use waypoint_core::session::{
    DeviceInfo, Session, SessionRefs, SessionRepository, SessionStatus, TimeEntryType,
};
use waypoint_core::state::StateEnvelope;

/// A transition together with the recovery point it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    pub session: Session,
    pub recovery_point: StoredRecoveryPoint,
}

/// Result of [`SessionLifecycleService::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub session: Session,
    pub recovery_point: StoredRecoveryPoint,
    /// Minutes from start to completion.
    pub total_duration: i64,
    /// Minutes spent in work entries.
    pub active_duration: i64,
}

/// Arguments of [`SessionLifecycleService::save_state`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveStateRequest {
    pub session_id: Option<String>,
    pub state: StateEnvelope,
    pub description: Option<String>,
    /// Defaults to [`RecoveryKind::Auto`].
    pub kind: Option<RecoveryKind>,
    pub refs: SessionRefs,
    /// Defaults to `["state-save"]`.
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

/// Session CRUD, status transitions and time accounting.
pub struct SessionLifecycleService {
    sessions: Arc<dyn SessionRepository>,
    points: Arc<dyn RecoveryPointRepository>,
    updater: SessionUpdater,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionLifecycleService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        points: Arc<dyn RecoveryPointRepository>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let updater = SessionUpdater::new(sessions.clone(), config.idle_expiry());
        Self {
            sessions,
            points,
            updater,
            clock,
            config,
        }
    }

    /// Starts a new active session for the caller.
    pub async fn start(
        &self,
        ctx: &RequestContext,
        refs: SessionRefs,
        state: Option<StateEnvelope>,
    ) -> Result<LifecycleOutcome> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();

        let session = Session::start(
            Uuid::new_v4().to_string(),
            user_id,
            refs,
            device_for(ctx, now),
            now,
        );
        let session = self.sessions.create(&session).await?;

        tracing::info!(
            session_id = %session.id,
            operation = "start",
            "[SessionLifecycle] Session started"
        );

        let recovery_point = self
            .record(ctx, &session, state, "Session started", tags::SESSION_START, now)
            .await?;
        Ok(LifecycleOutcome {
            session,
            recovery_point,
        })
    }

    /// Resumes a paused or expired session.
    ///
    /// An expired session's stale entry is closed at its last activity, so
    /// idle time never counts as work.
    pub async fn resume(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        state: Option<StateEnvelope>,
    ) -> Result<LifecycleOutcome> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();
        let device = device_for(ctx, now);

        let (session, _) = self
            .updater
            .update(session_id, user_id, now, |session| {
                ensure_transition(session, SessionStatus::Active)?;
                let stale_at = session.last_active_at;
                session.close_open_entries(stale_at);
                session.status = SessionStatus::Active;
                session.open_entry(TimeEntryType::Work, "Session resumed", now);
                session.devices.push(device);
                session.touch(now);
                Ok(())
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            operation = "resume",
            "[SessionLifecycle] Session resumed"
        );

        let recovery_point = self
            .record(ctx, &session, state, "Session resumed", tags::SESSION_RESUME, now)
            .await?;
        Ok(LifecycleOutcome {
            session,
            recovery_point,
        })
    }

    /// Pauses an active session, closing its open entry.
    pub async fn pause(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        state: Option<StateEnvelope>,
    ) -> Result<LifecycleOutcome> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();

        let (session, closed) = self
            .updater
            .update(session_id, user_id, now, |session| {
                ensure_transition(session, SessionStatus::Paused)?;
                let closed = session.close_open_entries(now);
                session.status = SessionStatus::Paused;
                session.touch(now);
                Ok(closed)
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            operation = "pause",
            closed_entries = closed,
            "[SessionLifecycle] Session paused"
        );

        let recovery_point = self
            .record(ctx, &session, state, "Session paused", tags::SESSION_PAUSE, now)
            .await?;
        Ok(LifecycleOutcome {
            session,
            recovery_point,
        })
    }

    /// Completes a session and computes its durations.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        state: Option<StateEnvelope>,
    ) -> Result<CompletionOutcome> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();

        let (session, (total_duration, active_duration)) = self
            .updater
            .update(session_id, user_id, now, |session| {
                ensure_transition(session, SessionStatus::Completed)?;
                let close_at = if session.status == SessionStatus::Expired {
                    session.last_active_at
                } else {
                    now
                };
                session.close_open_entries(close_at);

                let total = minutes_between(session.started_at, now);
                let active = session.work_minutes();
                session.status = SessionStatus::Completed;
                session.completed_at = Some(now);
                session.total_duration = Some(total);
                session.active_duration = Some(active);
                session.touch(now);
                Ok((total, active))
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            operation = "complete",
            total_duration,
            active_duration,
            "[SessionLifecycle] Session completed"
        );

        let recovery_point = self
            .record(ctx, &session, state, "Session completed", tags::SESSION_COMPLETE, now)
            .await?;
        Ok(CompletionOutcome {
            session,
            recovery_point,
            total_duration,
            active_duration,
        })
    }

    /// Replaces the context of an active session.
    pub async fn save_context(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        context: Value,
        description: Option<String>,
    ) -> Result<LifecycleOutcome> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();
        let envelope = StateEnvelope::context(context);

        let (session, _) = self
            .updater
            .update(session_id, user_id, now, |session| {
                if session.status != SessionStatus::Active {
                    return Err(WaypointError::invalid_state(format!(
                        "cannot update context of a {} session",
                        session.status
                    )));
                }
                session.context = envelope.clone();
                session.touch(now);
                Ok(())
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            operation = "save_context",
            "[SessionLifecycle] Session context updated"
        );

        let description = description.unwrap_or_else(|| "Session context updated".to_string());
        let recovery_point = self
            .record(ctx, &session, Some(envelope), &description, tags::CONTEXT_UPDATE, now)
            .await?;
        Ok(LifecycleOutcome {
            session,
            recovery_point,
        })
    }

    /// Records a recovery point, optionally against a session.
    ///
    /// A session id that does not resolve is logged and ignored; the point is
    /// still created without a session ref.
    pub async fn save_state(
        &self,
        ctx: &RequestContext,
        request: SaveStateRequest,
    ) -> Result<StoredRecoveryPoint> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();
        request.state.ensure_supported()?;

        let mut session_ref = None;
        if let Some(session_id) = request.session_id.as_deref() {
            match self
                .updater
                .update(session_id, user_id, now, |session| {
                    session.touch(now);
                    Ok(())
                })
                .await
            {
                Ok(_) => session_ref = Some(session_id.to_string()),
                Err(WaypointError::NotFound { .. }) => {
                    tracing::warn!(
                        session_id = %session_id,
                        operation = "save_state",
                        "[SessionLifecycle] Session not found, saving state without it"
                    );
                }
                Err(e @ WaypointError::Forbidden(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        operation = "save_state",
                        error = %e,
                        "[SessionLifecycle] Could not touch session"
                    );
                    session_ref = Some(session_id.to_string());
                }
            }
        }

        let mut point = StoredRecoveryPoint {
            id: Uuid::new_v4().to_string(),
            owner_id: user_id.to_string(),
            session_id: session_ref,
            description: Some(request.description.unwrap_or_else(|| "State saved".to_string())),
            refs: request.refs,
            kind: request.kind.unwrap_or(RecoveryKind::Auto),
            state: request.state,
            device_info: Some(device_for(ctx, now)),
            tags: request
                .tags
                .unwrap_or_else(|| vec![tags::STATE_SAVE.to_string()]),
            metadata: request.metadata,
            created_at: now,
            expires_at: None,
            is_archived: false,
        };
        point.apply_retention(self.config.auto_point_retention());
        self.points.create(&point).await?;

        tracing::info!(
            recovery_point_id = %point.id,
            session_id = ?point.session_id,
            operation = "save_state",
            "[SessionLifecycle] State saved"
        );
        Ok(point)
    }

    /// The session as the caller should see it right now.
    pub async fn get(&self, ctx: &RequestContext, session_id: &str) -> Result<Session> {
        let user_id = ctx.require_user()?;
        self.updater
            .load_owned(session_id, user_id, self.clock.now())
            .await
    }

    /// The caller's sessions, most recently started first.
    pub async fn list_sessions(&self, ctx: &RequestContext) -> Result<Vec<Session>> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();
        let idle = self.config.idle_expiry();
        Ok(self
            .sessions
            .find_by_owner(user_id)
            .await?
            .into_iter()
            .map(|s| s.observed(now, idle))
            .collect())
    }

    /// The caller's unexpired recovery points for a session, oldest first.
    pub async fn list_recovery_points(
        &self,
        ctx: &RequestContext,
        session_id: &str,
    ) -> Result<Vec<StoredRecoveryPoint>> {
        let user_id = ctx.require_user()?;
        let now = self.clock.now();
        self.updater.load_owned(session_id, user_id, now).await?;
        Ok(self
            .points
            .find_by_session(session_id)
            .await?
            .into_iter()
            .filter(|p| p.owner_id == user_id && !p.is_expired(now))
            .collect())
    }

    async fn record(
        &self,
        ctx: &RequestContext,
        session: &Session,
        state: Option<StateEnvelope>,
        description: &str,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<StoredRecoveryPoint> {
        let mut point = StoredRecoveryPoint {
            id: Uuid::new_v4().to_string(),
            owner_id: session.owner_id.clone(),
            session_id: Some(session.id.clone()),
            description: Some(description.to_string()),
            refs: session.refs.clone(),
            kind: RecoveryKind::Auto,
            state: state.unwrap_or_default(),
            device_info: Some(device_for(ctx, now)),
            tags: vec![tag.to_string()],
            metadata: None,
            created_at: now,
            expires_at: None,
            is_archived: false,
        };
        point.apply_retention(self.config.auto_point_retention());

        if let Err(e) = self.points.create(&point).await {
            tracing::error!(
                session_id = %session.id,
                tag,
                error = %e,
                "[SessionLifecycle] Failed to record recovery point"
            );
            return Err(e);
        }
        Ok(point)
    }
}

fn ensure_transition(session: &Session, next: SessionStatus) -> Result<()> {
    if session.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(WaypointError::invalid_state(format!(
            "session '{}' is {} and cannot become {}",
            session.id, session.status, next
        )))
    }
}

/// Device info for the caller, filling what the transport left out.
fn device_for(ctx: &RequestContext, now: DateTime<Utc>) -> DeviceInfo {
    let mut device = ctx.device_info(now);
    if device.window_id.is_none() {
        let suffix = Uuid::new_v4().simple().to_string();
        device.window_id = Some(format!("window_{}", &suffix[..9]));
    }
    if device.platform.is_none() {
        device.platform = Some("unknown".to_string());
    }
    device
}

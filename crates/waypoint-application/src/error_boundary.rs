//! Recovery points for captured failures.

use crate::session::{SaveStateRequest, SessionLifecycleService};
use crate::window::SessionHandle;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use waypoint_core::checkpoint::{RecoveryKind, SnapshotType, tags};
use waypoint_core::error::Result;
use waypoint_core::request::RequestContext;
use waypoint_core::state::{ErrorReport, StateEnvelope};

pub const ERROR_RECOVERY_POINT: &str = "Error recovery point";

/// Somewhere an error checkpoint can be recorded.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    /// Records a checkpoint and returns its id.
    async fn checkpoint(&self, description: &str, context: Value) -> Result<String>;
}

#[async_trait]
impl CheckpointSink for SessionHandle {
    async fn checkpoint(&self, description: &str, context: Value) -> Result<String> {
        self.create_recovery_point(description, SnapshotType::Manual, Some(context))
            .await
    }
}

/// Sends error checkpoints to the lifecycle service as `error` points.
pub struct LifecycleSink {
    service: Arc<SessionLifecycleService>,
    ctx: RequestContext,
    session_id: Option<String>,
}

impl LifecycleSink {
    pub fn new(
        service: Arc<SessionLifecycleService>,
        ctx: RequestContext,
        session_id: Option<String>,
    ) -> Self {
        Self {
            service,
            ctx,
            session_id,
        }
    }
}

#[async_trait]
impl CheckpointSink for LifecycleSink {
    async fn checkpoint(&self, description: &str, context: Value) -> Result<String> {
        let state = match serde_json::from_value::<ErrorReport>(context.clone()) {
            Ok(report) => StateEnvelope::error(report),
            Err(_) => StateEnvelope::context(context),
        };
        let point = self
            .service
            .save_state(
                &self.ctx,
                SaveStateRequest {
                    session_id: self.session_id.clone(),
                    state,
                    description: Some(description.to_string()),
                    kind: Some(RecoveryKind::Error),
                    tags: Some(vec![tags::ERROR.to_string()]),
                    ..Default::default()
                },
            )
            .await?;
        Ok(point.id)
    }
}

/// Turns captured failures into recovery points.
///
/// Without a sink the failure is only logged.
#[derive(Clone, Default)]
pub struct ErrorBoundary {
    sink: Option<Arc<dyn CheckpointSink>>,
}

impl ErrorBoundary {
    pub fn new(sink: Arc<dyn CheckpointSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    /// Records an "Error recovery point" carrying the failure. Never fails;
    /// returns the new point id when one was recorded.
    pub async fn capture(&self, error: &str, component_stack: Option<&str>) -> Option<String> {
        let report = ErrorReport {
            error: error.to_string(),
            component_stack: component_stack.map(str::to_string),
            timestamp: Utc::now(),
        };
        tracing::error!(error = %report.error, "[ErrorBoundary] Failure captured");

        let sink = self.sink.as_ref()?;
        let context = match serde_json::to_value(&report) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, "[ErrorBoundary] Could not encode error report");
                return None;
            }
        };

        match sink.checkpoint(ERROR_RECOVERY_POINT, context).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, "[ErrorBoundary] Failed to create recovery point");
                None
            }
        }
    }
}

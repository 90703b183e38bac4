//! Per-call request metadata.

use crate::error::{Result, WaypointError};
use crate::session::DeviceInfo;
use chrono::{DateTime, Utc};

/// What the transport knows about the caller of a lifecycle operation.
///
/// `user_id` comes from the external identity resolver; `None` means the
/// caller is anonymous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub window_id: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RequestContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window_id: impl Into<String>) -> Self {
        self.window_id = Some(window_id.into());
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// The caller id, or `Unauthorized`.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| WaypointError::unauthorized("no authenticated caller"))
    }

    pub fn device_info(&self, at: DateTime<Utc>) -> DeviceInfo {
        DeviceInfo {
            window_id: self.window_id.clone(),
            user_agent: self.user_agent.clone(),
            platform: self.platform.clone(),
            ip_address: self.ip_address.clone(),
            last_active_at: at,
        }
    }
}

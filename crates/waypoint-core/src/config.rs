//! Runtime configuration.
//!
//! Every field has a serde default so a partial (or empty) `config.toml`
//! is always a valid configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use version_migrate::DeriveQueryable as Queryable;

/// Root configuration document.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default, Queryable)]
#[queryable(entity = "config")]
pub struct WaypointConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub forms: FormConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-side lifecycle settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Inactivity after which an active session reads as expired.
    #[serde(default = "default_idle_expiry_minutes")]
    pub idle_expiry_minutes: i64,
    /// Lifetime of auto recovery points without an explicit expiry.
    #[serde(default = "default_auto_point_retention_days")]
    pub auto_point_retention_days: i64,
}

impl SessionConfig {
    pub fn idle_expiry(&self) -> Duration {
        Duration::minutes(self.idle_expiry_minutes)
    }

    pub fn auto_point_retention(&self) -> Duration {
        Duration::days(self.auto_point_retention_days)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_expiry_minutes: default_idle_expiry_minutes(),
            auto_point_retention_days: default_auto_point_retention_days(),
        }
    }
}

/// Per-window auto-save settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AutoSaveConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Idle time beyond which timer checkpoints are skipped.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_max_recovery_points")]
    pub max_recovery_points: usize,
    /// Debounce window for `checkpoint_debounced`.
    #[serde(default = "default_checkpoint_debounce_ms")]
    pub checkpoint_debounce_ms: u64,
}

impl AutoSaveConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::seconds(self.idle_threshold_secs as i64)
    }

    pub fn checkpoint_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.checkpoint_debounce_ms)
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
            max_recovery_points: default_max_recovery_points(),
            checkpoint_debounce_ms: default_checkpoint_debounce_ms(),
        }
    }
}

/// Form persistence settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FormConfig {
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    /// Whether edits are written back without an explicit flush.
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

impl FormConfig {
    pub fn save_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.save_debounce_ms)
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: default_save_debounce_ms(),
            auto_save: true,
        }
    }
}

/// Where and how state is written.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Overrides the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Log records after which the local store compacts itself.
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            compact_threshold: default_compact_threshold(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_idle_expiry_minutes() -> i64 {
    15
}

fn default_auto_point_retention_days() -> i64 {
    14
}

fn default_interval_secs() -> u64 {
    5 * 60
}

fn default_idle_threshold_secs() -> u64 {
    15 * 60
}

fn default_max_recovery_points() -> usize {
    20
}

fn default_save_debounce_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_debounce_ms() -> u64 {
    1_000
}

fn default_compact_threshold() -> usize {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

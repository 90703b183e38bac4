//! Unified path management for Waypoint files.
//!
//! Platform directories are resolved via `AppPaths` from the version-migrate
//! crate. Every path can be re-rooted under a custom base (tests, or the
//! `storage.data_dir` setting).
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/waypoint/          # Config directory (AppPaths default)
//! └── config.toml              # WaypointConfig
//!
//! ~/.local/share/waypoint/     # Data directory
//! ├── sessions/                # Session documents (AsyncDirStorage)
//! ├── recovery_points/         # Stored recovery points (AsyncDirStorage)
//! ├── local/                   # LocalStore log (window state)
//! └── blobs/                   # DirStore (large values)
//! ```

use std::path::{Path, PathBuf};
use version_migrate::AppPaths;
use waypoint_core::error::{Result, WaypointError};

const APP_NAME: &str = "waypoint";

/// Resolved Waypoint directories.
#[derive(Debug, Clone)]
pub struct WaypointPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl WaypointPaths {
    /// Platform default directories.
    pub fn platform() -> Result<Self> {
        let paths = AppPaths::new(APP_NAME);
        let config_dir = paths
            .config_dir()
            .map_err(|e| WaypointError::config(format!("Cannot resolve config directory: {e}")))?;
        let data_dir = paths
            .data_dir()
            .map_err(|e| WaypointError::config(format!("Cannot resolve data directory: {e}")))?;
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Everything under one base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            config_dir: base.to_path_buf(),
            data_dir: base.to_path_buf(),
        }
    }

    /// Keeps the config directory but moves data to `data_dir`.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn local_store_dir(&self) -> PathBuf {
        self.data_dir.join("local")
    }

    pub fn blob_store_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

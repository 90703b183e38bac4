//! Configuration loading.
//!
//! Reads `config.toml` from the Waypoint config directory through
//! version-migrate's `FileStorage`. A missing file is created with defaults
//! so users have something to edit.

use crate::dto::create_config_migrator;
use crate::paths::WaypointPaths;
use crate::storage::FileLock;
use std::path::{Path, PathBuf};
use version_migrate::{FileStorage, FileStorageStrategy, FormatStrategy, LoadBehavior};
use waypoint_core::config::WaypointConfig;
use waypoint_core::error::{Result, WaypointError};

const CONFIG_KEY: &str = "config";

pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(paths: &WaypointPaths) -> Self {
        Self::at(paths.config_file())
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_storage(&self) -> Result<FileStorage> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let strategy = FileStorageStrategy::new()
            .with_format(FormatStrategy::Toml)
            .with_load_behavior(LoadBehavior::CreateIfMissing);
        FileStorage::new(self.path.clone(), create_config_migrator(), strategy).map_err(|e| {
            WaypointError::config(format!("Failed to open {}: {}", self.path.display(), e))
        })
    }

    /// Loads the configuration, writing defaults first if the file has none.
    pub fn load_or_init(&self) -> Result<WaypointConfig> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut storage = self.open_storage()?;

        let configs: Vec<WaypointConfig> = storage.query(CONFIG_KEY).map_err(|e| {
            WaypointError::config(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        match configs.into_iter().next() {
            Some(config) => Ok(config),
            None => {
                tracing::info!(
                    path = %self.path.display(),
                    "[ConfigService] Writing default configuration"
                );
                let default_config = WaypointConfig::default();
                storage.update_and_save(CONFIG_KEY, vec![default_config.clone()])?;
                Ok(default_config)
            }
        }
    }

    pub fn save(&self, config: &WaypointConfig) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        let mut storage = self.open_storage()?;
        storage.update_and_save(CONFIG_KEY, vec![config.clone()])?;
        Ok(())
    }
}

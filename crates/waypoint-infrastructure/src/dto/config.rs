//! Config DTOs and migrations

use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, Versioned};
use waypoint_core::config::{
    AutoSaveConfig, FormConfig, LoggingConfig, SessionConfig, StorageConfig, WaypointConfig,
};

/// Config file schema V1.0.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct ConfigV1_0_0 {
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

impl IntoDomain<WaypointConfig> for ConfigV1_0_0 {
    fn into_domain(self) -> WaypointConfig {
        WaypointConfig {
            session: self.session,
            autosave: self.autosave,
            forms: self.forms,
            storage: self.storage,
            logging: self.logging,
        }
    }
}

impl FromDomain<WaypointConfig> for ConfigV1_0_0 {
    fn from_domain(config: WaypointConfig) -> Self {
        ConfigV1_0_0 {
            session: config.session,
            autosave: config.autosave,
            forms: config.forms,
            storage: config.storage,
            logging: config.logging,
        }
    }
}

/// Creates a Migrator for the `config` document.
pub fn create_config_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();
    let path = version_migrate::Migrator::define("config")
        .from::<ConfigV1_0_0>()
        .into_with_save::<WaypointConfig>();
    migrator
        .register(path)
        .expect("Failed to register config migration path");
    migrator
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let migrator = create_config_migrator();
        let config: WaypointConfig = migrator
            .load_flat_from(
                "config",
                json!({"version": "1.0.0", "autosave": {"max_recovery_points": 3}}),
            )
            .unwrap();
        assert_eq!(config.autosave.max_recovery_points, 3);
        assert_eq!(config.session.auto_point_retention_days, 14);
    }
}

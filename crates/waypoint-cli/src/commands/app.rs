use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use waypoint_application::SessionLifecycleService;
use waypoint_application::window::{CountingReset, SessionManager};
use waypoint_core::clock::SystemClock;
use waypoint_core::config::WaypointConfig;
use waypoint_core::request::RequestContext;
use waypoint_infrastructure::{
    ConfigService, FileRecoveryPointRepository, FileSessionRepository, LocalStore, WaypointPaths,
};

/// Resolved directories, configuration and caller for one invocation.
pub struct App {
    paths: WaypointPaths,
    config: WaypointConfig,
    ctx: RequestContext,
}

impl App {
    pub fn load(home: Option<PathBuf>, user: Option<String>) -> Result<Self> {
        let paths = match home {
            Some(home) => WaypointPaths::under(home),
            None => WaypointPaths::platform()?,
        };
        let config = ConfigService::new(&paths)
            .load_or_init()
            .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;
        let paths = match &config.storage.data_dir {
            Some(data_dir) => paths.with_data_dir(data_dir),
            None => paths,
        };

        let ctx = RequestContext {
            user_id: user,
            ..Default::default()
        }
        .with_platform(std::env::consts::OS);

        Ok(Self { paths, config, ctx })
    }

    pub fn paths(&self) -> &WaypointPaths {
        &self.paths
    }

    pub fn config(&self) -> &WaypointConfig {
        &self.config
    }

    pub fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    pub async fn lifecycle(&self) -> Result<SessionLifecycleService> {
        let sessions = FileSessionRepository::new(&self.paths)
            .await
            .context("Failed to open session storage")?;
        let points = FileRecoveryPointRepository::new(&self.paths)
            .await
            .context("Failed to open recovery point storage")?;
        Ok(SessionLifecycleService::new(
            Arc::new(sessions),
            Arc::new(points),
            Arc::new(SystemClock),
            self.config.session.clone(),
        ))
    }

    /// A window manager over the local store, with its point list loaded.
    pub fn window(&self, session_id: &str) -> Result<SessionManager> {
        let store = LocalStore::open(
            self.paths.local_store_dir(),
            self.config.storage.compact_threshold,
        )
        .context("Failed to open the local store")?;
        let mut manager = SessionManager::new(
            Some(session_id.to_string()),
            Arc::new(store),
            Arc::new(SystemClock),
            Arc::new(CountingReset::default()),
            self.config.autosave.clone(),
        );
        manager.load();
        Ok(manager)
    }
}

pub fn show_paths(app: &App) {
    println!("📁 Config: {}", app.paths.config_file().display());
    println!("📁 Data: {}", app.paths.data_dir().display());
    println!("📁 Local store: {}", app.paths.local_store_dir().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use waypoint_core::checkpoint::SnapshotType;
    use waypoint_core::session::SessionRefs;

    #[tokio::test]
    async fn test_home_keeps_everything_together() {
        let dir = TempDir::new().unwrap();
        let app = App::load(Some(dir.path().to_path_buf()), Some("alice".to_string())).unwrap();
        assert!(dir.path().join("config.toml").exists());

        let service = app.lifecycle().await.unwrap();
        let started = service
            .start(app.ctx(), SessionRefs::default(), None)
            .await
            .unwrap();

        let reopened = App::load(Some(dir.path().to_path_buf()), Some("alice".to_string()))
            .unwrap()
            .lifecycle()
            .await
            .unwrap();
        let sessions = reopened.list_sessions(app.ctx()).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, started.session.id);
    }

    #[tokio::test]
    async fn test_anonymous_caller_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = App::load(Some(dir.path().to_path_buf()), None).unwrap();
        let err = app
            .lifecycle()
            .await
            .unwrap()
            .start(app.ctx(), SessionRefs::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_window_points_survive_between_invocations() {
        let dir = TempDir::new().unwrap();
        let app = App::load(Some(dir.path().to_path_buf()), Some("alice".to_string())).unwrap();

        let id = {
            let mut manager = app.window("s-1").unwrap();
            manager
                .create_recovery_point("before refactor", SnapshotType::Manual, None)
                .unwrap()
        };

        let mut manager = app.window("s-1").unwrap();
        assert_eq!(manager.recovery_points().len(), 1);
        assert!(manager.restore_from_recovery_point(&id));
    }
}

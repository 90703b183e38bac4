//! Shared setup for repositories persisted through `AsyncDirStorage`.
//!
//! Each entity is one JSON document in `<base_dir>/<domain>/`, written in
//! the migrator's flat format and migrated to the latest schema on load.

use std::path::Path;
use version_migrate::{
    AppPaths, AsyncDirStorage, DirStorageStrategy, FilenameEncoding, FormatStrategy,
    MigrationError, Migrator, PathStrategy,
};
use waypoint_core::error::{Result, WaypointError};

const APP_NAME: &str = "waypoint";

/// Opens the `domain` directory under `base_dir`, creating it if needed.
pub(crate) async fn open_dir_storage(
    base_dir: &Path,
    domain: &str,
    migrator: Migrator,
) -> Result<AsyncDirStorage> {
    tokio::fs::create_dir_all(base_dir).await.map_err(|e| {
        WaypointError::storage("create_dir", format!("{}: {}", base_dir.display(), e))
    })?;

    let paths =
        AppPaths::new(APP_NAME).data_strategy(PathStrategy::CustomBase(base_dir.to_path_buf()));
    let strategy = DirStorageStrategy::default()
        .with_format(FormatStrategy::Json)
        .with_filename_encoding(FilenameEncoding::Direct);

    AsyncDirStorage::new(paths, domain, migrator, strategy)
        .await
        .map_err(|e| WaypointError::storage("open", format!("{domain}: {e}")))
}

/// Whether a load failed only because the document does not exist.
pub(crate) fn is_not_found(e: &MigrationError) -> bool {
    if matches!(e, MigrationError::EntityNotFound(_)) {
        return true;
    }
    let message = e.to_string();
    message.contains("No such file or directory")
        || message.contains("not found")
        || message.contains("cannot find")
}

/// Ids become file names, so path separators and dot segments never reach
/// the storage.
pub(crate) fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

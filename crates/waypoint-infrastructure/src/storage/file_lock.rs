//! Advisory lock files and sibling temp paths.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use waypoint_core::error::{Result, WaypointError};

/// Sibling path used for the write-then-rename step.
pub(crate) fn temp_path(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| WaypointError::io(format!("{} has no parent directory", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| WaypointError::io(format!("{} has no file name", path.display())))?;

    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// An exclusive advisory lock on `<path>.lock`, released on drop.
pub(crate) struct FileLock {
    file: File,
}

impl FileLock {
    /// Blocks until the lock is held.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive()
            .map_err(|e| WaypointError::storage("lock", format!("{}: {}", path.display(), e)))?;
        Ok(Self { file })
    }

    /// Fails immediately if another handle holds the lock.
    pub(crate) fn try_acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        file.try_lock_exclusive().map_err(|e| {
            WaypointError::storage("lock", format!("{} is locked: {}", path.display(), e))
        })?;
        Ok(Self { file })
    }

    fn open(path: &Path) -> Result<File> {
        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

//! Exclusive advisory lock on a checkpoint store directory
//!
//! Uses fd-lock. The lock is held for as long as the [`StoreLock`] lives, so a
//! second process opening the same store fails instead of interleaving writes.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file inside a store directory
pub const LOCK_FILE_NAME: &str = "store.lock";

/// Held exclusive lock on a store directory
pub struct StoreLock {
    // The OS lock is tied to this handle and released when it is closed.
    _lock: RwLock<File>,
    path: PathBuf,
}

impl StoreLock {
    /// Try to take the lock without blocking
    ///
    /// Returns [`ResumeError::LockError`] immediately if another handle holds it.
    pub fn try_acquire(dir: &Path) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "store {} is in use by another process: {e}",
                dir.display()
            ))
        })?;
        // Keep the lock past the guard: it stays held until the file handle closes.
        std::mem::forget(guard);

        debug!(path = %path.display(), "Acquired store lock");
        Ok(Self { _lock: lock, path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock").field("path", &self.path).finish()
    }
}

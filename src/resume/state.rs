//! Pagination state persistence
//!
//! The state file is small and rewritten after every page, so it is replaced
//! atomically (temp file, fsync, rename, directory fsync) and carries a
//! schema version.

use crate::PaginationState;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Current pagination state schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum accepted state file size (1 MiB); the record is a few hundred bytes
pub const MAX_STATE_FILE_SIZE: u64 = 1024 * 1024;

/// On-disk envelope around [`PaginationState`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    schema_version: String,
    #[serde(flatten)]
    state: PaginationState,
}

impl StateFile {
    /// Wrap a state with the current schema version
    pub fn new(state: PaginationState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            state,
        }
    }

    /// Schema version found in the file
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Unwrap the pagination state
    pub fn into_state(self) -> PaginationState {
        self.state
    }

    /// Atomically replace the file at `path` with this state
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        // Make the rename itself durable
        match std::fs::File::open(parent_dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(e) => warn!(
                dir = %parent_dir.display(),
                error = %e,
                "Failed to sync state directory; the last update may not survive a crash"
            ),
        }

        debug!(
            path = %path.display(),
            page = self.state.page,
            cursor = ?self.state.cursor,
            "Pagination state saved"
        );
        Ok(())
    }

    /// Load the state at `path`, `Ok(None)` when no state was ever saved
    pub fn load(path: &Path) -> Result<Option<Self>, ResumeError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResumeError::IoError(e.to_string())),
        };
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let file: StateFile = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, path = %path.display(), "Failed to deserialize pagination state");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if file.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %file.schema_version,
                expected_version = SCHEMA_VERSION,
                "Pagination state schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: file.schema_version,
            });
        }

        Ok(Some(file))
    }
}

/// Errors raised by the checkpoint store
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

//! Durable record of enumerated resources and pagination progress
//!
//! Layout of a store directory:
//!
//! ```text
//! pagination.json   PaginationState, replaced atomically on every update
//! resources.jsonl   one Resource per line, append-only
//! store.lock        advisory lock held while the store is open
//! ```
//!
//! Resources are appended and synced before the pagination state moves on,
//! so a crash between the two writes only causes the page to be fetched
//! again. Appends skip ids that are already stored, which makes that
//! re-fetch harmless.

use super::lock::StoreLock;
use super::state::{ResumeError, StateFile};
use crate::{PaginationState, Resource};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pagination state file name
pub const STATE_FILE_NAME: &str = "pagination.json";

/// Resource log file name
pub const RESOURCES_FILE_NAME: &str = "resources.jsonl";

/// Checkpoint store bound to one directory
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    pagination: Option<PaginationState>,
    known_ids: HashSet<String>,
    _lock: StoreLock,
}

/// Read-only snapshot of a store, taken without the lock
#[derive(Debug, Clone)]
pub struct StoreSummary {
    /// Last committed pagination state, if any
    pub pagination: Option<PaginationState>,
    /// Number of distinct stored resources
    pub resource_count: usize,
}

impl CheckpointStore {
    /// Open (or create) the store in `dir`, taking its exclusive lock
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let dir = dir.into();
        let lock = StoreLock::try_acquire(&dir)?;

        let pagination = StateFile::load(&dir.join(STATE_FILE_NAME))?.map(StateFile::into_state);
        let known_ids = scan_resource_ids(&dir.join(RESOURCES_FILE_NAME), true)?;

        info!(
            dir = %dir.display(),
            resources = known_ids.len(),
            page = pagination.as_ref().map(|p| p.page),
            "Opened checkpoint store"
        );

        Ok(Self {
            dir,
            pagination,
            known_ids,
            _lock: lock,
        })
    }

    /// Directory backing this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last committed pagination state, `None` if never checkpointed
    pub fn pagination(&self) -> Option<&PaginationState> {
        self.pagination.as_ref()
    }

    /// Number of distinct stored resources
    pub fn resource_count(&self) -> usize {
        self.known_ids.len()
    }

    /// Whether a resource with this id is already stored
    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    /// Append resources in order, skipping ids already stored
    ///
    /// Returns how many records were actually written. The log is synced
    /// before returning.
    pub fn append_resources(&mut self, resources: &[Resource]) -> Result<usize, ResumeError> {
        let mut batch_ids = HashSet::new();
        let fresh: Vec<&Resource> = resources
            .iter()
            .filter(|r| !self.known_ids.contains(&r.id) && batch_ids.insert(r.id.as_str()))
            .collect();

        if fresh.is_empty() {
            debug!(offered = resources.len(), "No new resources to append");
            return Ok(0);
        }

        let mut buffer = Vec::new();
        for resource in &fresh {
            serde_json::to_writer(&mut buffer, resource)
                .map_err(|e| ResumeError::SerializationError(e.to_string()))?;
            buffer.push(b'\n');
        }

        let path = self.dir.join(RESOURCES_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ResumeError::IoError(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(&buffer)
            .map_err(|e| ResumeError::IoError(format!("Failed to append resources: {e}")))?;
        file.sync_data()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync resources: {e}")))?;

        for resource in &fresh {
            self.known_ids.insert(resource.id.clone());
        }

        debug!(
            offered = resources.len(),
            appended = fresh.len(),
            total = self.known_ids.len(),
            "Appended resources"
        );
        Ok(fresh.len())
    }

    /// Upsert the pagination state (last write wins)
    pub fn save_pagination(&mut self, state: PaginationState) -> Result<(), ResumeError> {
        StateFile::new(state.clone()).save(&self.dir.join(STATE_FILE_NAME))?;
        self.pagination = Some(state);
        Ok(())
    }

    /// Record a throttling pause at `position`, keeping its cursor and page
    pub fn record_resume_at(
        &mut self,
        position: &PaginationState,
        resume_at: DateTime<Utc>,
    ) -> Result<(), ResumeError> {
        let state = PaginationState {
            resume_at: Some(resume_at),
            updated_at: Utc::now(),
            ..position.clone()
        };
        self.save_pagination(state)
    }

    /// Drop a recorded pause that has elapsed
    pub fn clear_resume_at(&mut self) -> Result<(), ResumeError> {
        match self.pagination.clone() {
            Some(mut state) if state.resume_at.is_some() => {
                state.resume_at = None;
                state.updated_at = Utc::now();
                self.save_pagination(state)
            }
            _ => Ok(()),
        }
    }

    /// All stored resources in insertion order
    pub fn resources(&self) -> Result<Vec<Resource>, ResumeError> {
        read_resources(&self.dir.join(RESOURCES_FILE_NAME))
    }

    /// Snapshot a store without locking it
    pub fn inspect(dir: &Path) -> Result<StoreSummary, ResumeError> {
        let pagination = StateFile::load(&dir.join(STATE_FILE_NAME))?.map(StateFile::into_state);
        let resource_count = scan_resource_ids(&dir.join(RESOURCES_FILE_NAME), false)?.len();
        Ok(StoreSummary {
            pagination,
            resource_count,
        })
    }

    /// Delete all checkpoint state in `dir`
    ///
    /// Fails if the store is currently open elsewhere. Returns `false` when
    /// there was nothing to delete.
    pub fn reset(dir: &Path) -> Result<bool, ResumeError> {
        if !dir.exists() {
            return Ok(false);
        }

        let lock = StoreLock::try_acquire(dir)?;
        for name in [STATE_FILE_NAME, RESOURCES_FILE_NAME] {
            match std::fs::remove_file(dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ResumeError::IoError(e.to_string())),
            }
        }
        drop(lock);
        std::fs::remove_dir_all(dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        info!(dir = %dir.display(), "Checkpoint store reset");
        Ok(true)
    }
}

/// Collect stored ids; with `repair` set, a torn trailing line is cut off so
/// later appends start on a clean line.
fn scan_resource_ids(path: &Path, repair: bool) -> Result<HashSet<String>, ResumeError> {
    let mut ids = HashSet::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(ResumeError::IoError(e.to_string())),
    };

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut complete_len: u64 = 0;
    let mut torn = false;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| ResumeError::IoError(e.to_string()))?;
        if read == 0 {
            break;
        }
        if line.last() != Some(&b'\n') {
            torn = true;
            break;
        }
        complete_len += read as u64;

        match serde_json::from_slice::<Resource>(&line) {
            Ok(resource) => {
                ids.insert(resource.id);
            }
            Err(e) => warn!(error = %e, "Skipping unreadable resource record"),
        }
    }

    if torn {
        warn!(
            path = %path.display(),
            offset = complete_len,
            "Resource log ends with a partial record"
        );
        if repair {
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| ResumeError::IoError(e.to_string()))?;
            file.set_len(complete_len)
                .map_err(|e| ResumeError::IoError(format!("Failed to truncate torn record: {e}")))?;
            file.sync_all()
                .map_err(|e| ResumeError::IoError(e.to_string()))?;
        }
    }

    Ok(ids)
}

fn read_resources(path: &Path) -> Result<Vec<Resource>, ResumeError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ResumeError::IoError(e.to_string())),
    };

    let mut seen = HashSet::new();
    let mut resources = Vec::new();
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| ResumeError::IoError(e.to_string()))?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Resource>(&line) {
            Ok(resource) => {
                if seen.insert(resource.id.clone()) {
                    resources.push(resource);
                }
            }
            Err(e) => warn!(error = %e, "Skipping unreadable resource record"),
        }
    }
    Ok(resources)
}

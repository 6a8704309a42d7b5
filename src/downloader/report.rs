//! Per-resource results of a download pass

use std::fmt;
use std::path::PathBuf;

/// Classification of a per-resource failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Fetching the bytes failed
    Network,
    /// Writing the file failed
    Storage,
    /// The destination path was unsafe or malformed
    PathValidation,
    /// Anything else, including cancellation
    Other,
}

impl FailureKind {
    /// Stable lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::PathValidation => "path-validation",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSuccess {
    /// Resource id
    pub id: String,
    /// Final file path
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
}

/// A resource that could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    /// Resource id
    pub id: String,
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable cause
    pub message: String,
}

/// A resource skipped because an earlier one already targets its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePath {
    /// Skipped resource id
    pub id: String,
    /// Resource that owns the path
    pub kept_id: String,
    /// Shared destination
    pub path: PathBuf,
}

/// Outcome of [`super::Downloader::download_all`]
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Resources written
    pub succeeded: Vec<DownloadSuccess>,
    /// Resources that failed, each with its cause
    pub failed: Vec<DownloadFailure>,
    /// Resources skipped as path duplicates
    pub duplicates: Vec<DuplicatePath>,
}

impl DownloadReport {
    /// Number of resources accounted for
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.duplicates.len()
    }

    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total bytes written
    pub fn bytes_written(&self) -> u64 {
        self.succeeded.iter().map(|s| s.bytes).sum()
    }

    /// Failures of one kind
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &DownloadFailure> {
        self.failed.iter().filter(move |f| f.kind == kind)
    }

    /// Look up a failure by resource id
    pub fn failure(&self, id: &str) -> Option<&DownloadFailure> {
        self.failed.iter().find(|f| f.id == id)
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded ({} bytes), {} failed, {} duplicate paths skipped",
            self.succeeded.len(),
            self.bytes_written(),
            self.failed.len(),
            self.duplicates.len()
        )
    }
}

//! Bounded-concurrency downloads of recorded resources
//!
//! [`Downloader::download_all`] takes the resources of a completed
//! enumeration and writes each one under the download root:
//!
//! 1. **Destination**: the path is built and validated before any request,
//!    see [`crate::output::destination_path`]
//! 2. **Transfer**: the body is streamed into a uniquely named hidden
//!    `.part` file next to the destination and renamed into place once the
//!    last chunk is synced, so an existing file is replaced atomically and a
//!    failed transfer never leaves a truncated file behind
//! 3. **Report**: every resource ends up in exactly one bucket of the
//!    [`DownloadReport`]
//!
//! A failing resource never aborts the batch. Transfers are not retried.
//!
//! # Components
//!
//! - [`config`] - Concurrency and progress constants
//! - [`report`] - Per-resource outcomes

pub mod config;
pub mod report;

pub use report::{DownloadFailure, DownloadReport, DownloadSuccess, DuplicatePath, FailureKind};

use crate::fetcher::{Content, ContentSource, FetchError};
use crate::metrics::{self, DownloadMetrics};
use crate::output::{destination_path, PathError};
use crate::shutdown::{self, SharedShutdown};
use crate::Resource;
use futures_util::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Failure of a single transfer
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Destination path rejected
    #[error("invalid destination: {0}")]
    Path(#[from] PathError),

    /// Fetching the content failed
    #[error("network error: {0}")]
    Network(String),

    /// Body ended before the declared size
    #[error("incomplete transfer: expected {expected} bytes, received {received}")]
    Incomplete {
        /// Size declared by the source
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Filesystem failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Shutdown was requested before or during the transfer
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl TransferError {
    /// Classification reported for this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Path(_) => FailureKind::PathValidation,
            Self::Network(_) | Self::Incomplete { .. } => FailureKind::Network,
            Self::Storage(_) => FailureKind::Storage,
            Self::Cancelled => FailureKind::Other,
        }
    }
}

impl From<FetchError> for TransferError {
    fn from(err: FetchError) -> Self {
        Self::Network(err.to_string())
    }
}

fn storage(context: &str, path: &Path, err: std::io::Error) -> TransferError {
    TransferError::Storage(format!("{context} {}: {err}", path.display()))
}

/// Downloads resources into a local directory tree
pub struct Downloader {
    source: Arc<dyn ContentSource>,
    download_root: PathBuf,
    concurrency: usize,
    shutdown: Option<SharedShutdown>,
    progress: Option<ProgressBar>,
}

impl Downloader {
    /// Create a downloader writing under `download_root`
    pub fn new(source: Arc<dyn ContentSource>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            download_root: download_root.into(),
            concurrency: config::DEFAULT_CONCURRENCY,
            shutdown: shutdown::get_global_shutdown(),
            progress: None,
        }
    }

    /// Set the number of concurrent transfers (clamped to `1..=MAX_CONCURRENCY`)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = config::clamp_concurrency(concurrency);
        self
    }

    /// Use a specific shutdown coordinator
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Advance a progress bar once per resource
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Root directory files are written under
    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Configured concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Download every resource, at most `concurrency` at a time
    ///
    /// Resources whose destination collides with an earlier resource are
    /// skipped and listed in [`DownloadReport::duplicates`].
    pub async fn download_all(&self, resources: Vec<Resource>) -> DownloadReport {
        let mut report = DownloadReport::default();
        let mut owners: HashMap<PathBuf, String> = HashMap::new();
        let mut jobs = Vec::with_capacity(resources.len());

        if let Some(progress) = &self.progress {
            progress.set_length(resources.len() as u64);
        }

        for resource in resources {
            match destination_path(&self.download_root, &resource) {
                Ok(path) => {
                    if let Some(kept_id) = owners.get(&path) {
                        warn!(
                            "Skipping {}: destination {} already taken by {}",
                            resource.id,
                            path.display(),
                            kept_id
                        );
                        report.duplicates.push(DuplicatePath {
                            id: resource.id,
                            kept_id: kept_id.clone(),
                            path,
                        });
                        self.tick();
                    } else {
                        owners.insert(path.clone(), resource.id.clone());
                        jobs.push((resource, path));
                    }
                }
                Err(err) => {
                    let err = TransferError::from(err);
                    metrics::record_download_failure(&resource.id, err.kind());
                    report.failed.push(DownloadFailure {
                        id: resource.id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    self.tick();
                }
            }
        }

        info!(
            "Downloading {} resources with concurrency {}",
            jobs.len(),
            self.concurrency
        );

        let mut results = stream::iter(jobs)
            .map(|(resource, path)| async move {
                let result = self.download_one(&resource, &path).await;
                (resource, path, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((resource, path, result)) = results.next().await {
            match result {
                Ok(bytes) => report.succeeded.push(DownloadSuccess {
                    id: resource.id,
                    path,
                    bytes,
                }),
                Err(err) => {
                    warn!("Failed to download {}: {}", resource.id, err);
                    report.failed.push(DownloadFailure {
                        id: resource.id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
            self.tick();
        }

        if let Some(progress) = &self.progress {
            progress.finish_with_message(report.to_string());
        }

        info!("Download pass finished: {}", report);
        report
    }

    fn tick(&self) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }

    /// Download one resource to an already validated destination
    async fn download_one(
        &self,
        resource: &Resource,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let metrics = DownloadMetrics::start(&resource.id);

        let result = self.transfer(resource, destination).await;
        match &result {
            Ok(bytes) => metrics.record_success(*bytes),
            Err(err) => metrics.record_failure(err.kind()),
        }
        result
    }

    async fn transfer(
        &self,
        resource: &Resource,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        if self.shutdown_requested() {
            return Err(TransferError::Cancelled);
        }

        let parent = destination.parent().unwrap_or(&self.download_root);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage("failed to create directory", parent, e))?;

        let content = self.source.fetch(&resource.source_url).await?;

        // Created exclusively under a random name, so it never shares a path
        // with another resource's destination. Dropping the path removes it.
        let (file, part) = tempfile::Builder::new()
            .prefix(".")
            .suffix(config::PART_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| storage("failed to create temporary file in", parent, e))?
            .into_parts();

        let bytes = self
            .write_part(resource, content, tokio::fs::File::from_std(file), &part)
            .await?;
        part.persist(destination)
            .map_err(|e| storage("failed to move into place", destination, e.error))?;
        debug!("Wrote {} ({} bytes)", destination.display(), bytes);
        Ok(bytes)
    }

    async fn write_part(
        &self,
        resource: &Resource,
        content: Content,
        mut file: tokio::fs::File,
        part: &Path,
    ) -> Result<u64, TransferError> {
        let Content {
            total_size,
            mut stream,
        } = content;

        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if self.shutdown_requested() {
                return Err(TransferError::Cancelled);
            }

            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| storage("failed to write", part, e))?;
            received += chunk.len() as u64;

            match total_size {
                Some(total) => {
                    debug!("Downloading {} ({}/{} bytes)", resource.id, received, total)
                }
                None => debug!("Downloading {} ({} bytes)", resource.id, received),
            }
        }

        file.flush()
            .await
            .map_err(|e| storage("failed to flush", part, e))?;
        file.sync_all()
            .await
            .map_err(|e| storage("failed to sync", part, e))?;

        if let Some(expected) = total_size {
            if received != expected {
                return Err(TransferError::Incomplete { expected, received });
            }
        }

        Ok(received)
    }
}

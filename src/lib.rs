//! # Cloud Asset Mirror Library
//!
//! Mirrors a remote cloud asset library (Cloudinary's Admin API) to local
//! storage. Enumeration progress is checkpointed after every page so a run can
//! be stopped, restarted, or suspended by provider throttling without losing
//! its place.
//!
//! ## Features
//!
//! - **Resumable Enumeration**: cursor and page are checkpointed after each page
//! - **Throttle Aware**: rate-limit responses suspend the run until the
//!   provider's advertised retry time instead of failing it
//! - **Idempotent Storage**: resources are keyed by id, re-fetched pages never
//!   duplicate records
//! - **Safe Downloads**: destination paths are validated against traversal and
//!   written atomically
//! - **Isolated Failures**: one broken asset never aborts the batch
//!
//! ## Quick Start
//!
//! ```no_run
//! use cloud_asset_mirror::config::MirrorConfig;
//! use cloud_asset_mirror::mirror::{Mirror, PassOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig::from_env()?;
//! let mirror = Mirror::from_config(&config)?;
//!
//! match mirror.run_pass().await? {
//!     PassOutcome::Completed(report) => println!("{} downloaded", report.succeeded.len()),
//!     PassOutcome::Suspended { resume_at } => println!("throttled until {resume_at}"),
//!     PassOutcome::Interrupted => println!("stopped"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`resume`] - Checkpoint store: resource log and pagination state
//! - [`fetcher`] - Listing API and content source abstractions plus HTTP clients
//! - [`enumerator`] - Paged enumeration state machine and throttle classification
//! - [`scheduler`] - Single-slot resumption scheduling
//! - [`downloader`] - Bounded-concurrency streaming downloads
//! - [`output`] - Destination path validation
//! - [`mirror`] - Pipeline tying enumeration, scheduling and downloads together

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Credentials and run configuration
pub mod config;

/// Resource downloads
pub mod downloader;

/// Paged enumeration of the remote library
pub mod enumerator;

/// Remote collaborators: listing API and content source
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Enumerate-then-download pipeline
pub mod mirror;

/// Destination path handling
pub mod output;

/// Checkpoint store
pub mod resume;

/// Deferred resumption after throttling
pub mod scheduler;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use resume::CheckpointStore;

/// One remote asset as recorded in the checkpoint store
///
/// Records are append-only: once stored, a resource is never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    /// Stable unique identifier (the provider's public id)
    pub id: String,
    /// Absolute URL the content can be fetched from
    pub source_url: String,
    /// Logical folder as reported by the provider, may be empty
    #[serde(default)]
    pub folder: String,
    /// File extension / type tag, may be empty
    #[serde(default)]
    pub format: String,
    /// When this record was enumerated
    pub fetched_at: DateTime<Utc>,
    /// Size advertised by the listing, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl Resource {
    /// File name the resource is stored under: `{id}.{format}`, or `{id}`
    /// when the provider reports no format.
    pub fn file_name(&self) -> String {
        if self.format.is_empty() {
            self.id.clone()
        } else {
            format!("{}.{}", self.id, self.format)
        }
    }
}

/// Enumeration progress for one store
///
/// `page` is the number of the next page to request. An absent `cursor`
/// means "start" while `complete` is false and "finished" once it is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationState {
    /// Continuation token for the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Next page number, starting at 1
    pub page: u64,
    /// Enumeration must not proceed before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    /// Set once a page arrived without a continuation cursor
    #[serde(default)]
    pub complete: bool,
    /// Last time this record was written
    pub updated_at: DateTime<Utc>,
}

impl PaginationState {
    /// State of a run that has not fetched anything yet
    pub fn fresh(cursor: Option<String>, page: u64) -> Self {
        Self {
            cursor,
            page: page.max(1),
            resume_at: None,
            complete: false,
            updated_at: Utc::now(),
        }
    }

    /// State after a page was stored: advance the page and take the new cursor
    pub fn advanced(&self, next_cursor: Option<String>) -> Self {
        Self {
            complete: next_cursor.is_none(),
            cursor: next_cursor,
            page: self.page.saturating_add(1),
            resume_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether enumeration is still blocked at `now`
    pub fn is_suspended_at(&self, now: DateTime<Utc>) -> bool {
        self.resume_at.is_some_and(|at| at > now)
    }
}

//! Resumable enumeration of the remote listing
//!
//! One pass walks the listing page by page from the last committed
//! checkpoint:
//!
//! 1. Request the page at the current cursor (one request in flight at most)
//! 2. Append its resources to the store, then upsert the pagination state
//! 3. Stop when a page has no continuation cursor
//!
//! A throttling response records `resume_at` without moving the cursor and
//! ends the pass as [`EnumerationOutcome::Suspended`]; the caller arranges the
//! resumption. Any other failure ends the pass with an [`EnumerationError`],
//! leaving every earlier checkpoint intact.

pub mod signal;

use crate::fetcher::{ApiFailure, ListingApi};
use crate::metrics;
use crate::resume::{CheckpointStore, ResumeError};
use crate::shutdown::{self, SharedShutdown};
use crate::PaginationState;
use chrono::{DateTime, Utc};
use signal::{classify_signal, Signal};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use signal::ThrottlingSignal;

/// Upper bound on pages fetched in one pass
pub const MAX_PAGES_PER_PASS: u64 = 100_000;

/// How a pass ended without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumerationOutcome {
    /// The listing was walked to its last page
    Completed {
        /// Pages fetched during this pass
        pages_fetched: u64,
        /// New resources stored during this pass
        resources_recorded: u64,
    },
    /// The provider throttled us; nothing may be requested before `resume_at`
    Suspended {
        /// Earliest time to resume
        resume_at: DateTime<Utc>,
        /// Pages fetched before the throttle
        pages_fetched: u64,
    },
    /// Shutdown was requested between pages
    Interrupted {
        /// Pages fetched before stopping
        pages_fetched: u64,
    },
}

/// Errors that abort an enumeration pass
#[derive(Debug, thiserror::Error)]
pub enum EnumerationError {
    /// Non-throttling failure from the listing API
    #[error("listing API error: {0}")]
    Api(ApiFailure),

    /// Throttled, but the retry time could not be read from the response
    #[error("throttled without a readable retry time: {0}")]
    UnparseableRetryTime(String),

    /// Checkpoint store failure
    #[error("checkpoint store error: {0}")]
    Store(#[from] ResumeError),

    /// Another pass holds the store
    #[error("an enumeration pass is already running")]
    PassInProgress,

    /// The API handed back the cursor it was just given
    #[error("listing cursor did not advance: {0}")]
    CursorStalled(String),

    /// Safety cap on pages per pass
    #[error("page limit of {0} per pass exceeded")]
    PageLimitExceeded(u64),
}

/// Walks the listing API into the checkpoint store
pub struct Enumerator {
    api: Arc<dyn ListingApi>,
    store: Arc<Mutex<CheckpointStore>>,
    page_size: u32,
    shutdown: Option<SharedShutdown>,
}

impl Enumerator {
    /// Create an enumerator over `store` with the default page size
    pub fn new(api: Arc<dyn ListingApi>, store: Arc<Mutex<CheckpointStore>>) -> Self {
        Self {
            api,
            store,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Use a specific shutdown coordinator
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Shared handle to the store this enumerator writes
    pub fn store(&self) -> Arc<Mutex<CheckpointStore>> {
        Arc::clone(&self.store)
    }

    /// Run one enumeration pass
    ///
    /// `start_cursor` and `start_page` only apply when the store has never
    /// been checkpointed; otherwise the stored position always wins. A store
    /// whose last pass completed starts over from the first page.
    pub async fn enumerate(
        &self,
        start_cursor: Option<String>,
        start_page: Option<u64>,
    ) -> Result<EnumerationOutcome, EnumerationError> {
        let mut store = self
            .store
            .try_lock()
            .map_err(|_| EnumerationError::PassInProgress)?;

        let now = Utc::now();
        let mut state = match store.pagination().cloned() {
            None => {
                info!(
                    cursor = ?start_cursor,
                    page = start_page.unwrap_or(1),
                    "Starting fresh enumeration"
                );
                PaginationState::fresh(start_cursor, start_page.unwrap_or(1))
            }
            Some(stored) => {
                if let Some(resume_at) = stored.resume_at.filter(|at| *at > now) {
                    info!(%resume_at, "Enumeration still suspended by throttling");
                    return Ok(EnumerationOutcome::Suspended {
                        resume_at,
                        pages_fetched: 0,
                    });
                }
                if stored.resume_at.is_some() {
                    store.clear_resume_at()?;
                }
                if stored.complete {
                    info!("Previous enumeration completed, walking the listing again");
                    PaginationState::fresh(None, 1)
                } else {
                    if start_cursor.is_some() || start_page.is_some() {
                        debug!("Stored checkpoint takes precedence over start arguments");
                    }
                    info!(page = stored.page, cursor = ?stored.cursor, "Resuming enumeration");
                    PaginationState {
                        resume_at: None,
                        ..stored
                    }
                }
            }
        };

        let mut pages_fetched: u64 = 0;
        let mut resources_recorded: u64 = 0;

        loop {
            if self
                .shutdown
                .as_ref()
                .is_some_and(|s| s.is_shutdown_requested())
            {
                warn!(page = state.page, "Shutdown requested, enumeration stopped between pages");
                return Ok(EnumerationOutcome::Interrupted { pages_fetched });
            }

            if pages_fetched >= MAX_PAGES_PER_PASS {
                return Err(EnumerationError::PageLimitExceeded(MAX_PAGES_PER_PASS));
            }

            let cursor = state.cursor.clone();
            debug!(page = state.page, cursor = ?cursor, "Requesting page");

            let page = match self.api.list_page(self.page_size, cursor.as_deref()).await {
                Ok(page) => page,
                Err(failure) => {
                    return match classify_signal(&failure) {
                        Signal::Throttled(signal) => {
                            store.record_resume_at(&state, signal.resume_at)?;
                            metrics::record_throttle();
                            warn!(
                                page = state.page,
                                resume_at = %signal.resume_at,
                                "Listing throttled, checkpoint kept"
                            );
                            Ok(EnumerationOutcome::Suspended {
                                resume_at: signal.resume_at,
                                pages_fetched,
                            })
                        }
                        Signal::Failed(err) => {
                            error!(page = state.page, error = %err, "Enumeration aborted");
                            Err(err)
                        }
                    };
                }
            };

            let received = page.resources.len();
            let inserted = store.append_resources(&page.resources)?;

            if let (Some(previous), Some(next)) = (&cursor, &page.next_cursor) {
                if previous == next {
                    return Err(EnumerationError::CursorStalled(next.clone()));
                }
            }

            let next_state = state.advanced(page.next_cursor);
            store.save_pagination(next_state.clone())?;

            metrics::record_page(received, inserted);
            info!(
                page = state.page,
                received,
                inserted,
                next_cursor = ?next_state.cursor,
                "Page fetched"
            );

            pages_fetched += 1;
            resources_recorded += inserted as u64;
            state = next_state;

            if state.complete {
                info!(
                    pages_fetched,
                    resources_recorded,
                    total_resources = store.resource_count(),
                    "Enumeration complete"
                );
                return Ok(EnumerationOutcome::Completed {
                    pages_fetched,
                    resources_recorded,
                });
            }
        }
    }
}

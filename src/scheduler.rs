//! Deferred resumption after throttling
//!
//! A [`ResumeScheduler`] holds at most one pending resumption. Scheduling
//! again replaces the pending one, so repeated throttling signals never stack
//! callbacks. The scheduler keeps no enumeration state: the task it runs reads
//! everything it needs from the checkpoint store.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work to run once the resume time has passed
pub type ResumeTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Furthest ahead a resumption may be scheduled, in hours
pub const MAX_SCHEDULE_HORIZON_HOURS: i64 = 7 * 24;

/// Why a resumption could not be registered
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// Requested time is further ahead than the scheduler accepts
    #[error("resume time {at} is more than {horizon_hours}h ahead")]
    BeyondHorizon {
        /// Requested resume time
        at: DateTime<Utc>,
        /// Accepted horizon in hours
        horizon_hours: i64,
    },

    /// No async runtime is available to run the timer
    #[error("no async runtime available to schedule resumption")]
    NoRuntime,

    /// The scheduler was closed
    #[error("scheduler is closed")]
    Closed,
}

/// Registers a single future re-invocation
pub trait ResumeScheduler: Send + Sync {
    /// Run `task` at or after `at`, replacing any pending resumption
    fn schedule_at(&self, at: DateTime<Utc>, task: ResumeTask) -> Result<(), SchedulingError>;

    /// Time of the pending resumption, if any
    fn pending(&self) -> Option<DateTime<Utc>>;

    /// Drop the pending resumption without running it
    fn cancel(&self);
}

#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
    generation: u64,
    closed: bool,
}

struct Pending {
    at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Scheduler backed by the tokio timer
pub struct TokioScheduler {
    slot: Arc<Mutex<Slot>>,
    horizon: Duration,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    /// Scheduler with the default horizon
    pub fn new() -> Self {
        Self::with_horizon(Duration::hours(MAX_SCHEDULE_HORIZON_HOURS))
    }

    /// Scheduler accepting resume times up to `horizon` ahead
    pub fn with_horizon(horizon: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            horizon,
        }
    }

    /// Cancel anything pending and refuse further scheduling
    pub fn close(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.closed = true;
        if let Some(pending) = slot.pending.take() {
            pending.handle.abort();
        }
    }
}

impl ResumeScheduler for TokioScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: ResumeTask) -> Result<(), SchedulingError> {
        let now = Utc::now();
        if at - now > self.horizon {
            return Err(SchedulingError::BeyondHorizon {
                at,
                horizon_hours: self.horizon.num_hours(),
            });
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulingError::NoRuntime)?;

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.closed {
            return Err(SchedulingError::Closed);
        }
        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
            info!(previous = %previous.at, replacement = %at, "Replacing pending resumption");
        }

        slot.generation += 1;
        let generation = slot.generation;
        // A time already in the past fires right away.
        let delay = (at - now).to_std().unwrap_or_default();
        let shared = Arc::clone(&self.slot);

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.pending.as_ref().map(|p| p.generation) == Some(generation) {
                    slot.pending = None;
                }
            }
            debug!(%at, "Running scheduled resumption");
            task.await;
        });

        slot.pending = Some(Pending {
            at,
            generation,
            handle,
        });
        info!(resume_at = %at, delay_secs = delay.as_secs(), "Resumption scheduled");
        Ok(())
    }

    fn pending(&self) -> Option<DateTime<Utc>> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.pending.as_ref().map(|p| p.at)
    }

    fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.pending.take() {
            pending.handle.abort();
            warn!(resume_at = %pending.at, "Pending resumption cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

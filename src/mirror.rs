//! Enumerate-then-download pipeline
//!
//! A [`Mirror`] runs passes: enumerate from the last checkpoint, and once the
//! listing is exhausted download every recorded resource exactly once. A
//! throttled pass hands a resumption to the [`ResumeScheduler`] and returns
//! [`PassOutcome::Suspended`]; the resumed pass publishes its outcome on a
//! channel read by [`Mirror::next_scheduled_outcome`].

use crate::config::{ConfigError, MirrorConfig};
use crate::downloader::{DownloadReport, Downloader};
use crate::enumerator::{EnumerationError, EnumerationOutcome, Enumerator};
use crate::fetcher::cloudinary::CloudinaryClient;
use crate::fetcher::http::{build_http_client, HttpContentSource};
use crate::resume::{CheckpointStore, ResumeError};
use crate::scheduler::{ResumeScheduler, ResumeTask, SchedulingError, TokioScheduler};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// How a pass ended
#[derive(Debug)]
pub enum PassOutcome {
    /// Listing exhausted and the download pass ran
    Completed(DownloadReport),
    /// Throttled; a resumption is scheduled for `resume_at`
    Suspended {
        /// When the resumed pass runs
        resume_at: DateTime<Utc>,
    },
    /// Stopped by shutdown between pages
    Interrupted,
}

/// Errors that abort a pass
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Enumeration failed
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    /// The resumption could not be scheduled
    #[error("failed to schedule resumption: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Checkpoint store failure outside enumeration
    #[error("checkpoint store error: {0}")]
    Store(#[from] ResumeError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client construction failed
    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

type OutcomeResult = Result<PassOutcome, MirrorError>;

/// The pipeline: enumerator, downloader and resumption scheduler
pub struct Mirror {
    enumerator: Enumerator,
    downloader: Downloader,
    scheduler: Arc<dyn ResumeScheduler>,
    start_cursor: Option<String>,
    start_page: Option<u64>,
    outcome_tx: mpsc::UnboundedSender<OutcomeResult>,
    outcome_rx: Mutex<mpsc::UnboundedReceiver<OutcomeResult>>,
}

impl Mirror {
    /// Assemble a mirror from its parts
    pub fn new(
        enumerator: Enumerator,
        downloader: Downloader,
        scheduler: Arc<dyn ResumeScheduler>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            enumerator,
            downloader,
            scheduler,
            start_cursor: None,
            start_page: None,
            outcome_tx,
            outcome_rx: Mutex::new(outcome_rx),
        }
    }

    /// Start position used when the store has never been checkpointed
    pub fn with_start(mut self, cursor: Option<String>, page: Option<u64>) -> Self {
        self.start_cursor = cursor;
        self.start_page = page;
        self
    }

    /// Production wiring: Cloudinary listing, HTTP content, tokio scheduler
    ///
    /// Opens (and locks) the checkpoint store in `config.state_dir`.
    pub fn from_config(config: &MirrorConfig) -> Result<Arc<Self>, MirrorError> {
        config.validate()?;

        let store = CheckpointStore::open(&config.state_dir)?;
        let client = build_http_client().map_err(|e| MirrorError::Http(e.to_string()))?;

        let api = CloudinaryClient::new(
            client.clone(),
            config.api_base.clone(),
            config.credentials.clone(),
            config.resource_type.clone(),
        );
        info!(endpoint = %api.endpoint(), "Listing endpoint configured");

        let enumerator = Enumerator::new(Arc::new(api), Arc::new(Mutex::new(store)))
            .with_page_size(config.page_size);

        let mut downloader = Downloader::new(
            Arc::new(HttpContentSource::new(client)),
            config.download_root.clone(),
        )
        .with_concurrency(config.concurrency);
        if config.show_progress {
            downloader = downloader.with_progress(download_progress_bar());
        }

        let mirror = Self::new(enumerator, downloader, Arc::new(TokioScheduler::new()))
            .with_start(config.start_cursor.clone(), config.start_page);
        Ok(Arc::new(mirror))
    }

    /// Scheduler holding the pending resumption, if any
    pub fn scheduler(&self) -> &Arc<dyn ResumeScheduler> {
        &self.scheduler
    }

    /// Shared checkpoint store
    pub fn store(&self) -> Arc<Mutex<CheckpointStore>> {
        self.enumerator.store()
    }

    /// Run one pass
    ///
    /// Boxed because a suspended pass schedules another pass of itself.
    pub fn run_pass(self: Arc<Self>) -> BoxFuture<'static, OutcomeResult> {
        async move {
            let outcome = self
                .enumerator
                .enumerate(self.start_cursor.clone(), self.start_page)
                .await?;

            match outcome {
                EnumerationOutcome::Completed {
                    pages_fetched,
                    resources_recorded,
                } => {
                    let resources = {
                        let store = self.enumerator.store();
                        let store = store.lock().await;
                        store.resources()?
                    };
                    info!(
                        pages_fetched,
                        resources_recorded,
                        total = resources.len(),
                        "Enumeration finished, starting downloads"
                    );
                    let report = self.downloader.download_all(resources).await;
                    Ok(PassOutcome::Completed(report))
                }
                EnumerationOutcome::Suspended {
                    resume_at,
                    pages_fetched,
                } => {
                    self.schedule_resume(resume_at)?;
                    info!(%resume_at, pages_fetched, "Pass suspended until provider allows requests");
                    Ok(PassOutcome::Suspended { resume_at })
                }
                EnumerationOutcome::Interrupted { pages_fetched } => {
                    warn!(pages_fetched, "Pass interrupted, checkpoint kept");
                    Ok(PassOutcome::Interrupted)
                }
            }
        }
        .boxed()
    }

    fn schedule_resume(self: &Arc<Self>, resume_at: DateTime<Utc>) -> Result<(), SchedulingError> {
        let mirror = Arc::downgrade(self);
        let task: ResumeTask = Box::pin(async move {
            let Some(mirror) = mirror.upgrade() else {
                return;
            };
            let outcome_tx = mirror.outcome_tx.clone();
            let result = mirror.run_pass().await;
            if outcome_tx.send(result).is_err() {
                warn!("Resumed pass finished after the mirror was dropped");
            }
        });
        self.scheduler.schedule_at(resume_at, task)
    }

    /// Wait for the outcome of the next scheduled pass
    ///
    /// Returns `None` only if the channel closed, which cannot happen while
    /// the mirror is alive.
    pub async fn next_scheduled_outcome(&self) -> Option<OutcomeResult> {
        self.outcome_rx.lock().await.recv().await
    }
}

fn download_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Downloading resources");
    pb
}

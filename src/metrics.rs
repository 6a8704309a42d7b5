//! Observability metrics for the mirror pipeline
//!
//! Counters and histograms for enumeration progress, throttling and
//! downloads. Recording goes through the `metrics` facade, so every call is
//! a no-op until [`init_metrics`] installs the Prometheus exporter.

use crate::downloader::FailureKind;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g. "127.0.0.1:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Listing pages fetched and checkpointed"
    );

    describe_counter!(
        "resources_recorded_total",
        Unit::Count,
        "Resources newly appended to the checkpoint store"
    );

    describe_counter!(
        "throttle_signals_total",
        Unit::Count,
        "Rate limit responses that suspended enumeration"
    );

    describe_counter!(
        "downloads_completed_total",
        Unit::Count,
        "Resources written to the download root"
    );

    describe_counter!(
        "downloads_failed_total",
        Unit::Count,
        "Resources that failed to download, by failure kind"
    );

    describe_counter!(
        "download_bytes_total",
        Unit::Bytes,
        "Bytes written by completed downloads"
    );

    describe_histogram!(
        "download_duration_seconds",
        Unit::Seconds,
        "Time spent transferring one resource"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one checkpointed listing page
pub fn record_page(received: usize, inserted: usize) {
    counter!("pages_fetched_total").increment(1);
    counter!("resources_recorded_total").increment(inserted as u64);

    if received > inserted {
        debug!(
            received = received,
            inserted = inserted,
            "Page contained already recorded resources"
        );
    }
}

/// Record a throttling response
pub fn record_throttle() {
    counter!("throttle_signals_total").increment(1);
}

/// Timing and outcome of one resource transfer
pub struct DownloadMetrics {
    resource_id: String,
    start_time: Instant,
}

impl DownloadMetrics {
    /// Start timing a transfer
    pub fn start(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a completed transfer
    pub fn record_success(&self, bytes: u64) {
        let duration = self.start_time.elapsed();

        counter!("downloads_completed_total").increment(1);
        counter!("download_bytes_total").increment(bytes);
        histogram!("download_duration_seconds").record(duration.as_secs_f64());

        debug!(
            resource = %self.resource_id,
            bytes = bytes,
            duration_ms = duration.as_millis(),
            "Download recorded"
        );
    }

    /// Record a failed transfer
    pub fn record_failure(&self, kind: FailureKind) {
        record_download_failure(&self.resource_id, kind);
    }
}

/// Record a failure that happened before any transfer started
pub fn record_download_failure(resource_id: &str, kind: FailureKind) {
    counter!("downloads_failed_total", "kind" => kind.as_str()).increment(1);

    warn!(
        resource = %resource_id,
        kind = %kind,
        "Download failure recorded"
    );
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

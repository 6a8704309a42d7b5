//! `run` command: enumerate, wait out throttling, download

use super::{Cli, CliError, OutputFormat};
use crate::config::{MirrorConfig, DEFAULT_DOWNLOAD_ROOT, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::downloader::config::MAX_CONCURRENCY;
use crate::downloader::DownloadReport;
use crate::fetcher::cloudinary::DEFAULT_RESOURCE_TYPE;
use crate::metrics;
use crate::mirror::{Mirror, PassOutcome};
use crate::shutdown::SharedShutdown;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Arguments of `run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root directory for downloaded files
    #[arg(long, env = "MIRROR_DOWNLOAD_ROOT", default_value = DEFAULT_DOWNLOAD_ROOT)]
    pub download_root: PathBuf,

    /// Resources per listing page
    #[arg(
        long,
        default_value_t = DEFAULT_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64)
    )]
    pub page_size: u32,

    /// Number of concurrent downloads (default: 4, max: 32)
    #[arg(long, default_value = "4", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Resource type to list (image, video, raw)
    #[arg(long, default_value = DEFAULT_RESOURCE_TYPE)]
    pub resource_type: String,

    /// Cursor to start from when no checkpoint exists
    #[arg(long)]
    pub start_cursor: Option<String>,

    /// Page number to start counting from when no checkpoint exists
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub start_page: Option<u64>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Disable the download progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl RunArgs {
    /// Apply the flags on top of environment-derived defaults
    pub fn to_config(&self, cli: &Cli) -> Result<MirrorConfig, CliError> {
        let mut config = MirrorConfig::from_env()?;
        config.state_dir = cli.state_dir.clone();
        config.download_root = self.download_root.clone();
        config.page_size = self.page_size;
        config.concurrency = self.concurrency;
        config.resource_type = self.resource_type.clone();
        config.start_cursor = self.start_cursor.clone();
        config.start_page = self.start_page;
        config.show_progress = !self.no_progress && cli.output_format == OutputFormat::Human;
        config.validate()?;
        Ok(config)
    }

    /// Execute the command
    ///
    /// A throttled pass keeps the process alive until the scheduled pass
    /// finishes or shutdown is requested.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = self.to_config(cli)?;

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::MetricsError(e.to_string()))?;
        }

        info!(
            state_dir = %config.state_dir.display(),
            download_root = %config.download_root.display(),
            "Starting mirror run"
        );
        let mirror = Mirror::from_config(&config)?;
        let mut outcome = mirror.clone().run_pass().await?;

        loop {
            match outcome {
                PassOutcome::Completed(report) => {
                    print_report(&report, cli.output_format)?;
                    return Ok(());
                }
                PassOutcome::Interrupted => {
                    warn!("Run interrupted, progress saved; run again to continue");
                    return Ok(());
                }
                PassOutcome::Suspended { resume_at } => {
                    info!(%resume_at, "Throttled by provider, waiting for scheduled resumption");
                    tokio::select! {
                        next = mirror.next_scheduled_outcome() => {
                            outcome = next.ok_or_else(|| {
                                CliError::InvalidArgument(
                                    "scheduled resumption ended without an outcome".to_string(),
                                )
                            })??;
                        }
                        _ = shutdown.wait_for_shutdown() => {
                            mirror.scheduler().cancel();
                            warn!(%resume_at, "Shutdown while suspended, progress saved");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn print_report(report: &DownloadReport, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let failures: Vec<_> = report
                .failed
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "id": f.id,
                        "kind": f.kind.as_str(),
                        "message": f.message,
                    })
                })
                .collect();
            let duplicates: Vec<_> = report
                .duplicates
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "kept_id": d.kept_id,
                        "path": d.path.display().to_string(),
                    })
                })
                .collect();
            let output = serde_json::json!({
                "status": if report.is_clean() { "success" } else { "partial" },
                "downloaded": report.succeeded.len(),
                "bytes": report.bytes_written(),
                "failed": failures,
                "duplicates": duplicates,
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| CliError::OutputError(e.to_string()))?;
            println!("{rendered}");
        }
        OutputFormat::Human => {
            println!("Mirror pass complete: {report}");
            for failure in &report.failed {
                println!("  FAILED {} [{}]: {}", failure.id, failure.kind, failure.message);
            }
            for duplicate in &report.duplicates {
                println!(
                    "  SKIPPED {}: {} already written by {}",
                    duplicate.id,
                    duplicate.path.display(),
                    duplicate.kept_id
                );
            }
        }
    }
    Ok(())
}

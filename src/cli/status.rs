//! `status` command: print the stored checkpoint

use super::{CliError, OutputFormat};
use crate::resume::store::StoreSummary;
use crate::CheckpointStore;
use chrono::Utc;
use std::path::Path;

/// Print a snapshot of the store in `state_dir` without locking it
pub fn execute(state_dir: &Path, format: OutputFormat) -> Result<(), CliError> {
    let summary = CheckpointStore::inspect(state_dir)?;
    println!("{}", render(state_dir, &summary, format)?);
    Ok(())
}

fn render(state_dir: &Path, summary: &StoreSummary, format: OutputFormat) -> Result<String, CliError> {
    let now = Utc::now();
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "state_dir": state_dir.display().to_string(),
                "resources": summary.resource_count,
                "pagination": summary.pagination,
                "suspended": summary
                    .pagination
                    .as_ref()
                    .is_some_and(|p| p.is_suspended_at(now)),
            });
            serde_json::to_string_pretty(&output).map_err(|e| CliError::OutputError(e.to_string()))
        }
        OutputFormat::Human => {
            let mut lines = vec![
                format!("State directory: {}", state_dir.display()),
                format!("Resources recorded: {}", summary.resource_count),
            ];
            match &summary.pagination {
                None => lines.push("Enumeration: not started".to_string()),
                Some(state) if state.complete => lines.push(format!(
                    "Enumeration: complete after page {} (updated {})",
                    state.page.saturating_sub(1),
                    state.updated_at
                )),
                Some(state) => {
                    lines.push(format!(
                        "Enumeration: next page {} at cursor {}",
                        state.page,
                        state.cursor.as_deref().unwrap_or("<start>")
                    ));
                    if let Some(resume_at) = state.resume_at {
                        if state.is_suspended_at(now) {
                            lines.push(format!("Throttled until: {resume_at}"));
                        } else {
                            lines.push(format!("Throttle expired at: {resume_at}"));
                        }
                    }
                }
            }
            Ok(lines.join("\n"))
        }
    }
}

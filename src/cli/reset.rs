//! `reset` command: delete checkpoint state

use super::CliError;
use crate::CheckpointStore;
use std::path::Path;
use tracing::info;

/// Remove the store in `state_dir`; fails while a run holds it
pub fn execute(state_dir: &Path) -> Result<(), CliError> {
    if CheckpointStore::reset(state_dir)? {
        println!("Deleted checkpoint state in {}", state_dir.display());
    } else {
        info!(dir = %state_dir.display(), "No checkpoint state to delete");
        println!("Nothing to reset in {}", state_dir.display());
    }
    Ok(())
}

//! CLI command implementations

pub mod error;
pub mod reset;
pub mod run;
pub mod status;

pub use error::CliError;
pub use run::RunArgs;

use crate::config::DEFAULT_STATE_DIR;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Cloud asset mirror CLI
#[derive(Parser, Debug)]
#[command(name = "cloud-asset-mirror")]
#[command(about = "Resumable mirror of a Cloudinary asset library", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Checkpoint store directory
    #[arg(long, global = true, env = "MIRROR_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enumerate the library and download every resource
    Run(RunArgs),

    /// Print the stored checkpoint
    Status,

    /// Delete the checkpoint store
    Reset,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Machine-readable JSON
    Json,
    /// Plain text
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

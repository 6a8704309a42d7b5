//! Destination paths for downloaded resources

pub mod path;

pub use path::{destination_path, sanitize_relative, PathError};

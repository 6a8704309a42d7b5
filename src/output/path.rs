//! Destination path construction and validation
//!
//! Files land at `download_root / folder / "{id}.{format}"`. Folder and id
//! come from the remote provider, so both are treated as untrusted relative
//! paths:
//!
//! - `\` is read as a separator, so Windows-style input gets the same checks
//! - leading separators or drive prefixes (`/etc`, `C:\x`) are rejected
//! - any `..` segment is rejected (`../x`, `a/../../b`)
//! - empty and `.` segments are dropped
//!
//! Every component of the returned path below the root is a plain name, so
//! the result cannot escape `download_root`.

use crate::Resource;
use std::path::{Path, PathBuf};

/// Unsafe or malformed destination for one resource
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Value names an absolute location
    #[error("{field} is absolute: {value:?}")]
    Absolute {
        /// Which input was rejected
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Value climbs out of its parent with `..`
    #[error("{field} escapes its parent directory: {value:?}")]
    ParentEscape {
        /// Which input was rejected
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Value contains characters no file name may carry
    #[error("{field} contains invalid characters: {value:?}")]
    InvalidCharacter {
        /// Which input was rejected
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Value is required but empty
    #[error("{field} is empty")]
    Empty {
        /// Which input was rejected
        field: &'static str,
    },
}

/// Validate an untrusted relative path and return its clean segments
///
/// An empty input yields no segments.
pub fn sanitize_relative(field: &'static str, value: &str) -> Result<Vec<String>, PathError> {
    if value.contains('\0') {
        return Err(PathError::InvalidCharacter {
            field,
            value: value.to_string(),
        });
    }

    let normalized = value.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(PathError::Absolute {
            field,
            value: value.to_string(),
        });
    }

    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(PathError::ParentEscape {
                    field,
                    value: value.to_string(),
                })
            }
            other => segments.push(other.to_string()),
        }
    }
    Ok(segments)
}

fn has_drive_prefix(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn validate_format(format: &str) -> Result<(), PathError> {
    if format.contains(['/', '\\', '\0']) || format.contains("..") {
        return Err(PathError::InvalidCharacter {
            field: "format",
            value: format.to_string(),
        });
    }
    Ok(())
}

/// Build the destination path of `resource` under `root`
pub fn destination_path(root: &Path, resource: &Resource) -> Result<PathBuf, PathError> {
    let folder = sanitize_relative("folder", &resource.folder)?;
    let mut id = sanitize_relative("id", &resource.id)?;
    validate_format(&resource.format)?;

    let stem = id.pop().ok_or(PathError::Empty { field: "id" })?;
    let file_name = if resource.format.is_empty() {
        stem
    } else {
        format!("{stem}.{}", resource.format)
    };

    let mut path = root.to_path_buf();
    path.extend(folder);
    path.extend(id);
    path.push(file_name);

    if !path.starts_with(root) {
        return Err(PathError::ParentEscape {
            field: "path",
            value: path.display().to_string(),
        });
    }
    Ok(path)
}

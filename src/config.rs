//! Run configuration and credentials
//!
//! Credentials come from the environment (`CLOUD_NAME`, `API_KEY`,
//! `API_SECRET`), after loading a `.env` file from the working directory if
//! one exists. Everything else has a default and can be overridden from the
//! command line.

use crate::fetcher::cloudinary::{DEFAULT_API_BASE, DEFAULT_RESOURCE_TYPE};
use std::path::PathBuf;

/// Cloud account name variable
pub const ENV_CLOUD_NAME: &str = "CLOUD_NAME";
/// API key variable
pub const ENV_API_KEY: &str = "API_KEY";
/// API secret variable
pub const ENV_API_SECRET: &str = "API_SECRET";
/// Optional API base URL override
pub const ENV_API_BASE: &str = "CLOUDINARY_API_BASE";

/// Resources requested per listing page
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page the listing API accepts
pub const MAX_PAGE_SIZE: u32 = 500;

/// Default destination root for downloaded files
pub const DEFAULT_DOWNLOAD_ROOT: &str = "downloads";

/// Default checkpoint store directory
pub const DEFAULT_STATE_DIR: &str = ".mirror-state";

/// Configuration errors, all fatal before any network call
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A value is present but unusable
    #[error("invalid configuration {name}: {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Account credentials for the listing API
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Cloud account name
    pub cloud_name: String,
    /// API key
    pub api_key: String,
    /// API secret
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment (and `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            cloud_name: require(ENV_CLOUD_NAME)?,
            api_key: require(ENV_API_KEY)?,
            api_secret: require(ENV_API_SECRET)?,
        })
    }
}

/// Everything a mirror run needs
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Listing API credentials
    pub credentials: Credentials,
    /// Listing API base URL
    pub api_base: String,
    /// Resource type to list (image, video, raw)
    pub resource_type: String,
    /// Root directory for downloaded files
    pub download_root: PathBuf,
    /// Checkpoint store directory
    pub state_dir: PathBuf,
    /// Resources per listing page
    pub page_size: u32,
    /// Concurrent transfers
    pub concurrency: usize,
    /// Cursor to start from on a never-checkpointed run
    pub start_cursor: Option<String>,
    /// Page number to start from on a never-checkpointed run
    pub start_page: Option<u64>,
    /// Show a progress bar during downloads
    pub show_progress: bool,
}

impl MirrorConfig {
    /// Defaults around the given credentials
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            download_root: PathBuf::from(DEFAULT_DOWNLOAD_ROOT),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: crate::downloader::config::DEFAULT_CONCURRENCY,
            start_cursor: None,
            start_page: None,
            show_progress: false,
        }
    }

    /// Defaults with credentials and API base taken from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = Credentials::from_env()?;
        let mut config = Self::new(credentials);
        if let Some(base) = std::env::var(ENV_API_BASE).ok().filter(|b| !b.trim().is_empty()) {
            config.api_base = base;
        }
        Ok(config)
    }

    /// Check ranges that clap cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                name: "page_size",
                reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        let max = crate::downloader::config::MAX_CONCURRENCY;
        if self.concurrency == 0 || self.concurrency > max {
            return Err(ConfigError::Invalid {
                name: "concurrency",
                reason: format!("must be between 1 and {max}"),
            });
        }
        if self.resource_type.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "resource_type",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

//! Remote collaborators: the paged listing API and the content source
//!
//! Both sit behind traits so the enumeration and download logic can be
//! driven by in-memory fakes in tests.

use crate::Resource;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

pub mod cloudinary;
pub mod http;

/// A failed listing request as reported by the remote API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiFailure {
    /// The API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error message from the response body
        message: String,
    },

    /// The request never produced a response
    #[error("network error: {0}")]
    Network(String),

    /// The response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiFailure {
    /// HTTP status, when the API answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Free-text message carried by the failure
    pub fn message(&self) -> &str {
        match self {
            Self::Http { message, .. } => message,
            Self::Network(message) | Self::InvalidResponse(message) => message,
        }
    }
}

/// One page of the listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Resources in API response order
    pub resources: Vec<Resource>,
    /// Continuation token, `None` on the last page
    pub next_cursor: Option<String>,
}

/// Paged listing of remote resources
#[async_trait]
pub trait ListingApi: Send + Sync {
    /// Request a single page of at most `page_size` resources
    ///
    /// `cursor` is `None` for the first page.
    async fn list_page(&self, page_size: u32, cursor: Option<&str>)
        -> Result<ListingPage, ApiFailure>;
}

/// Errors raised while fetching content bytes
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),
}

/// Stream of content chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// Content of one resource being fetched
pub struct Content {
    /// Total size declared by the source, if any
    pub total_size: Option<u64>,
    /// Body chunks in order
    pub stream: ByteStream,
}

/// Source of resource bytes
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Start fetching the content at `url`
    async fn fetch(&self, url: &str) -> Result<Content, FetchError>;
}

//! Content source over plain HTTP(S)

use super::{Content, ContentSource, FetchError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Build the client shared by the listing API and the content source
///
/// Only the connect phase is bounded here: bodies may be large, so overall
/// request timeouts are set per request where they make sense.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Streams resource bodies with reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpContentSource {
    client: Client,
}

impl HttpContentSource {
    /// Create a source sharing an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(&self, url: &str) -> Result<Content, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let total_size = response.content_length();
        debug!(url, total_size, "Content response received");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Network(e.to_string())))
            .boxed();

        Ok(Content { total_size, stream })
    }
}

//! Cloudinary Admin API listing client
//!
//! Lists resources via `GET /v1_1/{cloud}/resources/{type}` with basic auth,
//! following `next_cursor` across pages. Rate limiting surfaces as HTTP 420
//! with a message such as
//! `Rate Limit Exceeded. Try again on 2024-05-01 13:00:00 UTC`, which is passed
//! through untouched for the enumerator to classify.

use super::{ApiFailure, ListingApi, ListingPage};
use crate::config::Credentials;
use crate::Resource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Admin API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Overall time allowed for one listing request (seconds)
const LISTING_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default resource type to list
pub const DEFAULT_RESOURCE_TYPE: &str = "image";

/// Listing client for one cloud account
pub struct CloudinaryClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    resource_type: String,
}

impl CloudinaryClient {
    /// Create a client for `credentials.cloud_name`
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        credentials: Credentials,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            resource_type: resource_type.into(),
        }
    }

    /// Full listing endpoint URL
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/resources/{}",
            self.base_url, self.credentials.cloud_name, self.resource_type
        )
    }
}

#[async_trait]
impl ListingApi for CloudinaryClient {
    async fn list_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<ListingPage, ApiFailure> {
        let url = self.endpoint();
        let mut params = vec![("max_results", page_size.to_string())];
        if let Some(cursor) = cursor {
            params.push(("next_cursor", cursor.to_string()));
        }

        debug!(url = %url, page_size, cursor = ?cursor, "Requesting listing page");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret))
            .query(&params)
            .timeout(Duration::from_secs(LISTING_REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| ApiFailure::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiFailure::Network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            let message = parse_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            warn!(status = status.as_u16(), message = %message, "Listing request failed");
            return Err(ApiFailure::Http {
                status: status.as_u16(),
                message,
            });
        }

        parse_listing(&body, Utc::now())
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    public_id: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    asset_folder: Option<String>,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    bytes: Option<u64>,
}

impl RawResource {
    fn into_resource(self, fetched_at: DateTime<Utc>) -> Result<Resource, ApiFailure> {
        let source_url = self.secure_url.or(self.url).ok_or_else(|| {
            ApiFailure::InvalidResponse(format!("resource {} has no URL", self.public_id))
        })?;

        Ok(Resource {
            id: self.public_id,
            source_url,
            folder: self.asset_folder.or(self.folder).unwrap_or_default(),
            format: self.format.unwrap_or_default(),
            fetched_at,
            bytes: self.bytes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Parse a successful listing body into a page
pub fn parse_listing(body: &str, fetched_at: DateTime<Utc>) -> Result<ListingPage, ApiFailure> {
    let response: ListResponse = serde_json::from_str(body)
        .map_err(|e| ApiFailure::InvalidResponse(format!("Failed to parse listing: {e}")))?;

    let resources = response
        .resources
        .into_iter()
        .map(|raw| raw.into_resource(fetched_at))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ListingPage {
        resources,
        next_cursor: response.next_cursor.filter(|c| !c.is_empty()),
    })
}

/// Extract `error.message` from an error body
pub fn parse_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
}

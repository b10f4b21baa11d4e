//! Storage API client
//!
//! Typed wrapper over `reqwest::Client` for the storage node endpoints:
//!
//! - `POST {endpoint}/list-objects` with `{"storageAccount": key}`,
//!   answering `{"keys": [name, ...]}`
//! - `POST {endpoint}/get-object-data` with `{"location": url}`
//!
//! Files are downloaded from the CDN at `{cdn}/{key}/{name}`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shdwdrive_http::client::StorageApiClient;
//!
//! # async fn example(key: shdwdrive_core::domain::StorageAccountKey) -> anyhow::Result<()> {
//! let client = StorageApiClient::with_defaults();
//! for name in client.list_objects(&key).await? {
//!     println!("{}", client.file_url(&key, &name));
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use shdwdrive_core::config::{NetworkConfig, DEFAULT_CDN, DEFAULT_ENDPOINT};
use shdwdrive_core::domain::{file_url, StorageAccountKey};

use crate::StorageApiError;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsRequest<'a> {
    storage_account: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ObjectDataRequest<'a> {
    location: &'a str,
}

// ============================================================================
// StorageApiClient
// ============================================================================

/// HTTP client for the storage node and the CDN
#[derive(Debug, Clone)]
pub struct StorageApiClient {
    client: Client,
    endpoint: String,
    cdn: String,
}

impl StorageApiClient {
    /// Creates a client for the given storage node and CDN base URLs
    pub fn new(endpoint: impl Into<String>, cdn: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            cdn: cdn.into(),
        }
    }

    /// Creates a client for the public storage node and CDN
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_CDN)
    }

    /// Creates a client from the `network` configuration section
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self::new(network.endpoint.clone(), network.cdn.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cdn(&self) -> &str {
        &self.cdn
    }

    /// CDN URL of a file
    pub fn file_url(&self, key: &StorageAccountKey, name: &str) -> String {
        file_url(&self.cdn, key, name)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, StorageApiError> {
        let base = Url::parse(&format!("{}/", self.endpoint.trim_end_matches('/')))?;
        Ok(base.join(path)?)
    }

    /// Lists the file names stored in an account
    pub async fn list_objects(&self, key: &StorageAccountKey) -> Result<Vec<String>> {
        debug!(key = %key, "Listing objects");
        let url = self.endpoint_url("list-objects")?;

        let response = self
            .client
            .post(url)
            .json(&ListObjectsRequest {
                storage_account: key.as_str(),
            })
            .send()
            .await
            .context("Failed to send list-objects request")?;
        let listing: ListObjectsResponse = check_status(response)
            .await
            .with_context(|| format!("list-objects for {key} failed"))?
            .json()
            .await
            .map_err(|e| StorageApiError::InvalidResponse(e.to_string()))
            .context("Failed to parse list-objects response")?;

        debug!(key = %key, objects = listing.keys.len(), "Objects listed");
        Ok(listing.keys)
    }

    /// Fetches the storage node's metadata record for a file URL
    pub async fn get_object_data(&self, location: &str) -> Result<serde_json::Value> {
        debug!(location, "Fetching object data");
        let url = self.endpoint_url("get-object-data")?;

        let response = self
            .client
            .post(url)
            .json(&ObjectDataRequest { location })
            .send()
            .await
            .context("Failed to send get-object-data request")?;
        check_status(response)
            .await
            .with_context(|| format!("get-object-data for {location} failed"))?
            .json()
            .await
            .map_err(|e| StorageApiError::InvalidResponse(e.to_string()))
            .context("Failed to parse get-object-data response")
    }

    /// Downloads a file's content from the CDN
    pub async fn download(&self, key: &StorageAccountKey, name: &str) -> Result<Vec<u8>> {
        let url = self.file_url(key, name);
        debug!(url = %url, "Downloading file");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send download request")?;
        let bytes = check_status(response)
            .await
            .with_context(|| format!("Download of {url} failed"))?
            .bytes()
            .await
            .context("Failed to read download response body")?;

        debug!(url = %url, bytes = bytes.len(), "File downloaded");
        Ok(bytes.to_vec())
    }
}

/// Maps non-success responses to [`StorageApiError`]
async fn check_status(response: Response) -> Result<Response, StorageApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(StorageApiError::NotFound(url));
    }
    Err(StorageApiError::Status { status, body })
}

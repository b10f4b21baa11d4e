//! shdwdrive HTTP - storage API and CDN client
//!
//! Provides:
//! - [`client::StorageApiClient`] for the `list-objects` and
//!   `get-object-data` endpoints and CDN downloads
//! - [`reader::HttpFileReader`], the [`IFileReader`] adapter built on it
//!
//! [`IFileReader`]: shdwdrive_core::ports::IFileReader

pub mod client;
pub mod reader;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the storage API or the CDN
#[derive(Debug, Error)]
pub enum StorageApiError {
    /// The requested object or account does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A base URL could not be joined with an endpoint path
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StorageApiError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StorageApiError::Network(e) => e.is_timeout() || e.is_connect(),
            StorageApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

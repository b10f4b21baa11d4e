//! Domain error types
//!
//! Errors raised while constructing or validating domain values.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Storage account or owner key is not a base58 public key
    #[error("Invalid account key: {0}")]
    InvalidAccountKey(String),

    /// Size specifier could not be parsed
    #[error("Invalid size specifier: {0}")]
    InvalidSizeSpec(String),

    /// File name is empty or contains a path separator
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

//! Provisioning client errors

use thiserror::Error;

/// Errors that can occur when talking to the provisioning API
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the request
    #[error("provision API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The join token was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The API URL cannot be used
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

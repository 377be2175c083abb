//! Platform errors

use thiserror::Error;

/// Errors returned while fetching the platform configuration
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform has no configuration for this node; not a failure
    #[error("no config source")]
    NoConfigSource,

    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configuration endpoint answered with an error status
    #[error("failed to download config from {url}: {status}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status
        status: u16,
    },

    /// Reading local platform data failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration URL cannot be used
    #[error("invalid config URL: {0}")]
    InvalidUrl(String),

    /// Platform-specific failure
    #[error("{0}")]
    Failed(String),

    /// The platform named on the command line is not supported
    #[error("unsupported platform {0:?}")]
    Unsupported(String),
}

impl PlatformError {
    /// Whether the error means there is nothing to fetch.
    pub fn is_no_config_source(&self) -> bool {
        matches!(self, PlatformError::NoConfigSource)
    }
}

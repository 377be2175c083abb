//! Controller-specific error types.
//!
//! Library errors are wrapped here so every controller returns a single
//! error type to the runtime, which restarts failed controllers with backoff.

use kube::Error as KubeError;
use machineconfig::{ContainerError, LoadError, ValidationError};
use platform::PlatformError;
use resources::StateError;
use siderolink_client::ProvisionError;
use thiserror::Error;

/// Errors that can occur in machined controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource state error
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Configuration decoding error
    #[error("{0}")]
    Load(#[from] LoadError),

    /// Configuration validation error
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Configuration container error
    #[error("{0}")]
    Container(#[from] ContainerError),

    /// Platform error
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Provisioning API error
    #[error("provision error: {0}")]
    Provision(#[from] ProvisionError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration acquisition failed
    #[error("{0}")]
    Acquire(String),

    /// WireGuard device or relay error
    #[error("wireguard error: {0}")]
    Wireguard(String),

    /// Reconciliation failed
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
}

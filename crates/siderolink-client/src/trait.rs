//! ProvisionClient trait for mocking

use crate::error::ProvisionError;
use crate::models::{ProvisionRequest, ProvisionResponse};

/// Provisioning API operations.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ProvisionClient: Send + Sync {
    /// Register the node and obtain its link parameters.
    async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ProvisionError>;
}

//! Mock ProvisionClient for unit testing

use crate::error::ProvisionError;
use crate::models::{ProvisionRequest, ProvisionResponse};
use crate::provision_trait::ProvisionClient;
use std::sync::{Arc, Mutex, PoisonError};

/// Mock provisioning API
///
/// Answers every request with the configured response (or error message) and
/// records the requests it received.
#[derive(Debug, Clone, Default)]
pub struct MockProvisionClient {
    response: Arc<Mutex<Option<ProvisionResponse>>>,
    error: Arc<Mutex<Option<String>>>,
    requests: Arc<Mutex<Vec<ProvisionRequest>>>,
}

impl MockProvisionClient {
    /// Create a mock answering with `response`
    pub fn new(response: ProvisionResponse) -> Self {
        let mock = Self::default();
        mock.set_response(response);
        mock
    }

    /// Replace the response
    pub fn set_response(&self, response: ProvisionResponse) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    /// Fail every following request with `message`
    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ProvisionRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl ProvisionClient for MockProvisionClient {
    async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ProvisionError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(message) = self.error.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(ProvisionError::Api(message));
        }

        self.response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ProvisionError::Api("no response configured".to_string()))
    }
}

//! Kubelet serving certificate waiting for approval.
//!
//! Until its serving CSR is approved the kubelet has no certificate and
//! aborts every TLS handshake with an internal error alert. The check fires
//! when the local kubelet does exactly that and a matching CSR is pending.

use super::DiagnosticCheck;
use crate::error::ControllerError;
use crate::kubernetes::CsrLister;
use crate::runtime::Input;
use async_trait::async_trait;
use machineconfig::constants::KUBELET_PORT;
use resources::State;
use resources::k8s::{NODENAME_ID, Nodename};
use resources::runtime::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// ID of the diagnostic.
pub const KUBELET_CSR_ID: &str = "kubelet-csr";

/// Message of the diagnostic.
pub const KUBELET_CSR_MESSAGE: &str = "kubelet server certificate rotation is enabled, but CSR is not approved";

/// Handshake failures meaning the kubelet has no serving certificate.
const INTERNAL_ERROR_SENTINELS: [&str; 2] = ["tls: internal error", "InternalError"];

/// Whether a handshake error is the kubelet's internal error alert.
pub fn is_internal_error(message: &str) -> bool {
    INTERNAL_ERROR_SENTINELS.iter().any(|s| message.contains(s))
}

/// Probes the local kubelet's TLS endpoint.
#[async_trait]
pub trait KubeletProbe: Send + Sync {
    /// Error of a TLS request to the kubelet, `None` when it succeeded.
    async fn handshake_error(&self) -> Option<String>;
}

/// Probe issuing an HTTPS request to the kubelet, trusting any certificate.
#[derive(Debug, Clone)]
pub struct HttpsKubeletProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpsKubeletProbe {
    /// Probe for the kubelet on this node.
    pub fn new() -> Result<Self, ControllerError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url: format!("https://127.0.0.1:{}/", KUBELET_PORT),
        })
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait]
impl KubeletProbe for HttpsKubeletProbe {
    async fn handshake_error(&self) -> Option<String> {
        match self.client.get(&self.url).send().await {
            // Any HTTP answer means TLS went through.
            Ok(_) => None,
            Err(e) => Some(error_chain(&e)),
        }
    }
}

/// Fires while the kubelet waits for its serving CSR to be approved.
pub struct KubeletCsrCheck {
    probe: Arc<dyn KubeletProbe>,
    csrs: Arc<dyn CsrLister>,
}

impl std::fmt::Debug for KubeletCsrCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeletCsrCheck").finish_non_exhaustive()
    }
}

impl KubeletCsrCheck {
    /// Check combining `probe` with CSRs from `csrs`.
    pub fn new(probe: Arc<dyn KubeletProbe>, csrs: Arc<dyn CsrLister>) -> Self {
        Self { probe, csrs }
    }
}

#[async_trait]
impl DiagnosticCheck for KubeletCsrCheck {
    fn id(&self) -> &'static str {
        KUBELET_CSR_ID
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<Nodename>()]
    }

    fn hysteresis(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn check(&self, state: &State) -> Result<Option<Diagnostic>, ControllerError> {
        let Some(nodename) = state.try_get::<Nodename>(NODENAME_ID)? else {
            return Ok(None);
        };

        let Some(error) = self.probe.handshake_error().await else {
            return Ok(None);
        };
        if !is_internal_error(&error) {
            debug!("Kubelet handshake failed for another reason: {}", error);
            return Ok(None);
        }

        let pending = self.csrs.pending_serving_csrs(&nodename.spec.nodename).await?;
        if pending.is_empty() {
            return Ok(None);
        }

        Ok(Some(Diagnostic {
            message: KUBELET_CSR_MESSAGE.to_string(),
            details: vec![
                format!("kubectl certificate approve {}", pending.join(" ")),
                format!("kubelet TLS handshake: {}", error),
            ],
        }))
    }
}

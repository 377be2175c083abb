//! Host addresses swallowed by the Kubernetes CIDRs.
//!
//! When every routed host address falls inside the pod or service CIDRs,
//! the `no-k8s` address list comes out empty and the node has nothing to
//! advertise to the cluster.

use super::DiagnosticCheck;
use crate::error::ControllerError;
use crate::reconciler::active_config;
use crate::runtime::Input;
use async_trait::async_trait;
use machineconfig::net::Prefix;
use resources::State;
use resources::config::MachineConfig;
use resources::network::{FILTER_NO_K8S, NODE_ADDRESS_ROUTED_ID, NodeAddress, filtered_node_address_id};
use resources::runtime::Diagnostic;
use std::time::Duration;

/// ID of the diagnostic.
pub const ADDRESS_OVERLAP_ID: &str = "address-overlap";

/// Message of the diagnostic.
pub const ADDRESS_OVERLAP_MESSAGE: &str = "host and Kubernetes pod/service CIDR addresses overlap";

fn joined(prefixes: &[impl ToString]) -> String {
    prefixes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Fires when the routed addresses exist but none survive the `no-k8s`
/// filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressOverlapCheck;

#[async_trait]
impl DiagnosticCheck for AddressOverlapCheck {
    fn id(&self) -> &'static str {
        ADDRESS_OVERLAP_ID
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<NodeAddress>(), Input::of::<MachineConfig>()]
    }

    fn hysteresis(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn check(&self, state: &State) -> Result<Option<Diagnostic>, ControllerError> {
        let Some(config) = active_config(state)?.and_then(|c| c.legacy().cloned()) else {
            return Ok(None);
        };
        let routed: Vec<Prefix> = state
            .try_get::<NodeAddress>(NODE_ADDRESS_ROUTED_ID)?
            .map(|r| r.spec.addresses)
            .unwrap_or_default();
        let Some(no_k8s) =
            state.try_get::<NodeAddress>(&filtered_node_address_id(NODE_ADDRESS_ROUTED_ID, FILTER_NO_K8S))?
        else {
            return Ok(None);
        };

        if routed.is_empty() || !no_k8s.spec.addresses.is_empty() {
            return Ok(None);
        }

        Ok(Some(Diagnostic {
            message: ADDRESS_OVERLAP_MESSAGE.to_string(),
            details: vec![
                format!("host routed addresses: [{}]", joined(&routed)),
                format!("Kubernetes pod CIDRs: [{}]", config.pod_cidrs().join(", ")),
                format!("Kubernetes service CIDRs: [{}]", config.service_cidrs().join(", ")),
            ],
        }))
    }
}

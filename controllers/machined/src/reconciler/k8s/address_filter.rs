//! Node address filters for Kubernetes CIDRs.
//!
//! `no-k8s` drops node addresses inside the pod and service CIDRs, `only-k8s`
//! keeps only those. Both disappear when there is no cluster configuration.

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::reconciler::active_config;
use crate::runtime::{Input, Reconcile};
use machineconfig::net::Prefix;
use resources::State;
use resources::config::MachineConfig;
use resources::network::{FILTER_NO_K8S, FILTER_ONLY_K8S, NodeAddressFilter};

/// Owner of the Kubernetes address filters.
pub const ADDRESS_FILTER_OWNER: &str = "k8s.NodeAddressFilterController";

/// Publishes the `no-k8s` and `only-k8s` filters.
#[derive(Debug, Default)]
pub struct AddressFilterController;

/// Pod and service CIDRs of the cluster, in that order.
pub fn kubernetes_cidrs(config: &machineconfig::types::v1alpha1::Config) -> Result<Vec<Prefix>, ControllerError> {
    config
        .pod_cidrs()
        .iter()
        .chain(config.service_cidrs().iter())
        .map(|cidr| {
            cidr.parse::<Prefix>()
                .map_err(|e| ControllerError::InvalidConfig(format!("Kubernetes CIDR {:?}: {}", cidr, e)))
        })
        .collect()
}

#[async_trait::async_trait]
impl Reconcile for AddressFilterController {
    fn name(&self) -> &'static str {
        ADDRESS_FILTER_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<MachineConfig>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, ADDRESS_FILTER_OWNER);

        let legacy = active_config(state)?.and_then(|config| config.legacy().cloned());
        if let Some(config) = legacy.filter(|c| c.cluster.is_some()) {
            let cidrs = kubernetes_cidrs(&config)?;
            outputs.modify(
                FILTER_NO_K8S,
                NodeAddressFilter {
                    include_subnets: Vec::new(),
                    exclude_subnets: cidrs.clone(),
                },
            )?;
            outputs.modify(
                FILTER_ONLY_K8S,
                NodeAddressFilter {
                    include_subnets: cidrs,
                    exclude_subnets: Vec::new(),
                },
            )?;
        }

        outputs.cleanup::<NodeAddressFilter>()
    }
}

//! Machine API access from Kubernetes workloads.

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::reconciler::active_config;
use crate::runtime::{Input, Reconcile};
use resources::State;
use resources::config::{MACHINE_TYPE_ID, MachineConfig, MachineTypeSpec};
use resources::k8s::{KUBEACCESS_ID, KubeaccessConfig};

/// Owner of the access configuration.
pub const KUBEACCESS_CONFIG_OWNER: &str = "cluster.KubernetesAccessConfigController";

/// Publishes `KubeaccessConfig` on control-plane nodes with the feature on.
#[derive(Debug, Default)]
pub struct KubeaccessConfigController;

#[async_trait::async_trait]
impl Reconcile for KubeaccessConfigController {
    fn name(&self) -> &'static str {
        KUBEACCESS_CONFIG_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<MachineConfig>(), Input::of::<MachineTypeSpec>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, KUBEACCESS_CONFIG_OWNER);

        let control_plane = state
            .try_get::<MachineTypeSpec>(MACHINE_TYPE_ID)?
            .is_some_and(|t| t.spec.machine_type.is_control_plane());
        let access = active_config(state)?
            .and_then(|config| config.legacy().and_then(|l| l.kubernetes_api_access().cloned()));

        if let Some(access) = access.filter(|_| control_plane) {
            outputs.modify(
                KUBEACCESS_ID,
                KubeaccessConfig {
                    enabled: true,
                    allowed_api_roles: access.allowed_roles,
                    allowed_kubernetes_namespaces: access.allowed_kubernetes_namespaces,
                },
            )?;
        }

        outputs.cleanup::<KubeaccessConfig>()
    }
}

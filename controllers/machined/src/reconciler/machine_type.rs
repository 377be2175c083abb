//! Machine role derived from the active configuration.

use super::active_config;
use crate::error::ControllerError;
use crate::runtime::{Input, Reconcile};
use resources::State;
use resources::config::{MACHINE_TYPE_ID, MachineConfig, MachineTypeSpec, MachineTypeValue};
use tracing::debug;

/// Owner of the machine type singleton.
pub const MACHINE_TYPE_OWNER: &str = "config.MachineTypeController";

/// Publishes the `MachineType` singleton.
#[derive(Debug, Default)]
pub struct MachineTypeController;

#[async_trait::async_trait]
impl Reconcile for MachineTypeController {
    fn name(&self) -> &'static str {
        MACHINE_TYPE_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<MachineConfig>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let machine_type = active_config(state)?
            .map(|config| MachineTypeValue::from(config.machine_type()))
            .unwrap_or_default();

        let resource = state.modify(MACHINE_TYPE_OWNER, MACHINE_TYPE_ID, MachineTypeSpec { machine_type })?;
        debug!("Machine type {:?} (version {})", machine_type, resource.version());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::complete_config;
    use resources::config::V1ALPHA1_ID;
    use machineconfig::types::v1alpha1::Config;
    use machineconfig::{Container, DocumentSpec};

    fn worker_config() -> Container {
        let mut config = Config::example();
        config.machine.as_mut().unwrap().machine_type = "worker".to_string();
        Container::from_legacy(config)
    }

    fn machine_type(state: &State) -> MachineTypeValue {
        state.get::<MachineTypeSpec>(MACHINE_TYPE_ID).unwrap().spec.machine_type
    }

    #[tokio::test]
    async fn test_unknown_without_config() {
        let state = State::new();
        MachineTypeController.reconcile(&state).await.unwrap();
        assert_eq!(machine_type(&state), MachineTypeValue::Unknown);
    }

    #[tokio::test]
    async fn test_follows_config() {
        let state = State::new();
        state
            .create("config.Setter", V1ALPHA1_ID, MachineConfig::new(complete_config()))
            .unwrap();
        MachineTypeController.reconcile(&state).await.unwrap();
        assert_eq!(machine_type(&state), MachineTypeValue::ControlPlane);

        // identical input keeps the version
        MachineTypeController.reconcile(&state).await.unwrap();
        assert_eq!(state.get::<MachineTypeSpec>(MACHINE_TYPE_ID).unwrap().version(), 1);

        state
            .update("config.Setter", V1ALPHA1_ID, MachineConfig::new(worker_config()))
            .unwrap();
        MachineTypeController.reconcile(&state).await.unwrap();
        assert_eq!(machine_type(&state), MachineTypeValue::Worker);
        assert_eq!(state.get::<MachineTypeSpec>(MACHINE_TYPE_ID).unwrap().version(), 2);
    }
}

//! Derivation controllers.
//!
//! Each controller projects the active machine configuration (and other
//! resources) into typed downstream resources. They are organized by the
//! resource group they produce:
//! - `machine_type`: machine role singleton
//! - `k8s`: control-plane component specs, address filters, machine API
//!   access from Kubernetes
//! - `siderolink`: out-of-band management link
//! - `diagnostics`: operator-facing warnings

pub mod diagnostics;
pub mod k8s;
pub mod machine_type;
pub mod siderolink;

use crate::error::ControllerError;
use machineconfig::Container;
use resources::State;
use resources::config::{MachineConfig, V1ALPHA1_ID};

/// The active configuration, if one was acquired.
pub(crate) fn active_config(state: &State) -> Result<Option<Container>, ControllerError> {
    Ok(state
        .try_get::<MachineConfig>(V1ALPHA1_ID)?
        .map(|resource| resource.spec.into_container()))
}

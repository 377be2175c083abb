//! Machine configuration resources (`config` namespace).

use crate::resource::ResourceSpec;
use machineconfig::{Container, MachineType};
use serde::{Deserialize, Serialize};

/// Namespace of configuration resources.
pub const NAMESPACE: &str = "config";

/// ID of the active configuration.
pub const V1ALPHA1_ID: &str = "v1alpha1";

/// ID of the configuration submitted through maintenance mode.
pub const MAINTENANCE_ID: &str = "maintenance";

/// ID of the configuration to persist on the state partition.
pub const PERSISTENT_ID: &str = "persistent";

/// A machine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    container: Container,
}

impl MachineConfig {
    /// Wraps a container as a readonly snapshot.
    pub fn new(container: Container) -> Self {
        Self {
            container: if container.is_readonly() {
                container
            } else {
                container.readonly_snapshot()
            },
        }
    }

    /// The wrapped configuration.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Consumes the resource, returning the configuration.
    pub fn into_container(self) -> Container {
        self.container
    }
}

impl ResourceSpec for MachineConfig {
    const TYPE: &'static str = "MachineConfigs.config.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// ID of the machine type singleton.
pub const MACHINE_TYPE_ID: &str = "machine-type";

/// Machine type derived from the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineTypeSpec {
    /// Machine type
    pub machine_type: MachineTypeValue,
}

/// Serializable mirror of [`MachineType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineTypeValue {
    /// Not set
    #[default]
    Unknown,
    /// Bootstrapping control plane
    Init,
    /// Control plane
    ControlPlane,
    /// Worker
    Worker,
}

impl From<MachineType> for MachineTypeValue {
    fn from(value: MachineType) -> Self {
        match value {
            MachineType::Unknown => MachineTypeValue::Unknown,
            MachineType::Init => MachineTypeValue::Init,
            MachineType::ControlPlane => MachineTypeValue::ControlPlane,
            MachineType::Worker => MachineTypeValue::Worker,
        }
    }
}

impl MachineTypeValue {
    /// Whether the machine runs control-plane components.
    pub fn is_control_plane(&self) -> bool {
        matches!(self, MachineTypeValue::Init | MachineTypeValue::ControlPlane)
    }
}

impl ResourceSpec for MachineTypeSpec {
    const TYPE: &'static str = "MachineTypes.config.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// ID of the acquire singletons.
pub const ACQUIRE_ID: &str = "acquire";

/// Presence of this resource starts configuration acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquireConfigSpec;

impl ResourceSpec for AcquireConfigSpec {
    const TYPE: &'static str = "AcquireConfigSpecs.config.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// Published once acquisition finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquireConfigStatus;

impl ResourceSpec for AcquireConfigStatus {
    const TYPE: &'static str = "AcquireConfigStatuses.config.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

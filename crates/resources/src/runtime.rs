//! Runtime resources (`runtime` namespace).

use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};

/// Namespace of runtime resources.
pub const NAMESPACE: &str = "runtime";

/// ID of the maintenance service request.
pub const MAINTENANCE_SERVICE_ID: &str = "maintenance";

/// Requests the maintenance service to start; its presence is the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaintenanceServiceRequest;

impl ResourceSpec for MaintenanceServiceRequest {
    const TYPE: &'static str = "MaintenanceServiceRequests.runtime.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// A warning about the node surfaced to operators.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Short description
    pub message: String,
    /// Supporting details
    pub details: Vec<String>,
}

impl ResourceSpec for Diagnostic {
    const TYPE: &'static str = "Diagnostics.runtime.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// ID of the hardware identity singleton.
pub const SYSTEM_INFORMATION_ID: &str = "systeminformation";

/// Hardware identity of the node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInformation {
    /// SMBIOS system UUID
    pub uuid: String,
}

impl ResourceSpec for SystemInformation {
    const TYPE: &'static str = "SystemInformations.hardware.talos.dev";
    const NAMESPACE: &'static str = "hardware";
}

/// ID of the unique token singleton.
pub const UNIQUE_TOKEN_ID: &str = "unique-token";

/// Token identifying this node to the management API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniqueMachineToken {
    /// Token
    pub token: String,
}

impl ResourceSpec for UniqueMachineToken {
    const TYPE: &'static str = "UniqueMachineTokens.runtime.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// ID of the kernel command line singleton.
pub const KERNEL_CMDLINE_ID: &str = "cmdline";

/// Kernel command line of the running node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelCmdline {
    /// Raw command line
    pub cmdline: String,
}

impl ResourceSpec for KernelCmdline {
    const TYPE: &'static str = "KernelCmdlines.runtime.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

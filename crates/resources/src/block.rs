//! Volume lifecycle and mount handshake (`runtime` namespace).
//!
//! The volume subsystem owns [`VolumeLifecycle`] and [`VolumeMountStatus`];
//! consumers own their [`VolumeMountRequest`]s.

use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Namespace of block resources.
pub const NAMESPACE: &str = "runtime";

/// ID of the volume lifecycle singleton.
pub const LIFECYCLE_ID: &str = "lifecycle";

/// Volume holding the persisted configuration.
pub const STATE_VOLUME_ID: &str = "STATE";

/// Exists while volumes may be mounted; torn down on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeLifecycle;

impl ResourceSpec for VolumeLifecycle {
    const TYPE: &'static str = "VolumeLifecycles.block.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// Request to mount a volume.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMountRequest {
    /// Volume to mount
    pub volume_id: String,
    /// Controller requesting the mount
    pub requester: String,
    /// Keep the mount across short requester disconnects
    pub detached: bool,
}

impl ResourceSpec for VolumeMountRequest {
    const TYPE: &'static str = "VolumeMountRequests.block.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// A satisfied mount request; shares the request's ID.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMountStatus {
    /// Mounted volume
    pub volume_id: String,
    /// Controller that requested the mount
    pub requester: String,
    /// Mount point
    pub target: PathBuf,
    /// Mounted read-only
    pub read_only: bool,
    /// Mount survives short requester disconnects
    pub detached: bool,
}

impl ResourceSpec for VolumeMountStatus {
    const TYPE: &'static str = "VolumeMountStatuses.block.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

//! Persistence of the machine configuration on the state partition.
//!
//! Whenever `MachineConfig(persistent)` moves past the last persisted
//! version, the configuration is captured as pending and the state volume is
//! requested. Once the volume subsystem reports the mount, the file is
//! replaced atomically (temporary file, then rename) and the mount released.
//!
//! The controller holds a finalizer on `VolumeLifecycle` so volumes are not
//! unmounted on shutdown while a write is outstanding.

use crate::error::ControllerError;
use crate::runtime::{Input, Reconcile};
use machineconfig::constants::CONFIG_FILENAME;
use machineconfig::Container;
use resources::block::{
    LIFECYCLE_ID, STATE_VOLUME_ID, VolumeLifecycle, VolumeMountRequest, VolumeMountStatus,
};
use resources::config::{MachineConfig, PERSISTENT_ID};
use resources::{ResourceKey, State};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Owner of the mount request and the lifecycle finalizer.
pub const PERSISTENCE_OWNER: &str = "config.PersistenceController";

/// ID of the state volume mount request.
pub const MOUNT_REQUEST_ID: &str = "config.PersistenceController-STATE";

#[derive(Debug)]
struct Pending {
    version: u64,
    config: Container,
}

/// Writes the persistent configuration to the state partition.
#[derive(Debug, Default)]
pub struct PersistenceController {
    persisted_version: u64,
    pending: Option<Pending>,
}

impl PersistenceController {
    /// A controller that has not persisted anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the last configuration written to disk.
    pub fn persisted_version(&self) -> u64 {
        self.persisted_version
    }

    fn capture(&mut self, state: &State) -> Result<(), ControllerError> {
        let Some(resource) = state.try_get::<MachineConfig>(PERSISTENT_ID)? else {
            return Ok(());
        };
        let version = resource.version();
        if version <= self.persisted_version || self.pending.as_ref().is_some_and(|p| p.version == version) {
            return Ok(());
        }

        debug!("Config version {} is pending persistence", version);
        self.pending = Some(Pending {
            version,
            config: resource.spec.into_container(),
        });
        Ok(())
    }

    async fn persist(&mut self, state: &State) -> Result<(), ControllerError> {
        let Some(pending) = &self.pending else {
            return Ok(());
        };

        let Some(mount) = state.try_get::<VolumeMountStatus>(MOUNT_REQUEST_ID)? else {
            state.modify(
                PERSISTENCE_OWNER,
                MOUNT_REQUEST_ID,
                VolumeMountRequest {
                    volume_id: STATE_VOLUME_ID.to_string(),
                    requester: PERSISTENCE_OWNER.to_string(),
                    detached: true,
                },
            )?;
            return Ok(());
        };
        if mount.metadata.is_tearing_down() {
            return Ok(());
        }

        let bytes = pending.config.bytes()?;
        let version = pending.version;
        let status_key = ResourceKey::of::<VolumeMountStatus>(MOUNT_REQUEST_ID);
        state.add_finalizer(&status_key, PERSISTENCE_OWNER)?;
        let written = write_atomically(&mount.spec.target, &bytes).await;
        state.remove_finalizer(&status_key, PERSISTENCE_OWNER)?;

        match written {
            Ok(()) => {
                info!("Persisted config version {} to {}", version, mount.spec.target.display());
                self.persisted_version = version;
                self.pending = None;
                let request = ResourceKey::of::<VolumeMountRequest>(MOUNT_REQUEST_ID);
                state.teardown_and_destroy(PERSISTENCE_OWNER, &request)?;
            }
            // Pending stays set; the next event retries.
            Err(e) => warn!("Failed to persist config version {}: {}", version, e),
        }
        Ok(())
    }
}

/// Writes `bytes` to the config file under `root` through a temporary file,
/// so the file holds either the old or the new contents.
///
/// The temporary file is removed when the write fails.
pub async fn write_atomically(root: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let target = root.join(CONFIG_FILENAME);
    let tmp = root.join(format!("{}-tmp", CONFIG_FILENAME));

    if let Err(e) = replace(&tmp, &target, bytes).await {
        match tokio::fs::remove_file(&tmp).await {
            Err(cleanup) if cleanup.kind() != std::io::ErrorKind::NotFound => {
                warn!("Cannot remove {}: {}", tmp.display(), cleanup);
            }
            _ => {}
        }
        return Err(e);
    }

    // The rename only survives a crash once the directory is synced.
    tokio::fs::File::open(root).await?.sync_all().await
}

async fn replace(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(tmp)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp, target).await
}

#[async_trait::async_trait]
impl Reconcile for PersistenceController {
    fn name(&self) -> &'static str {
        PERSISTENCE_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::of::<MachineConfig>(),
            Input::of::<VolumeLifecycle>(),
            Input::of::<VolumeMountStatus>(),
        ]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let Some(lifecycle) = state.try_get::<VolumeLifecycle>(LIFECYCLE_ID)? else {
            return Ok(());
        };
        let lifecycle_key = ResourceKey::of::<VolumeLifecycle>(LIFECYCLE_ID);

        if !lifecycle.metadata.is_tearing_down() {
            state.add_finalizer(&lifecycle_key, PERSISTENCE_OWNER)?;
        }

        self.capture(state)?;
        self.persist(state).await?;

        if lifecycle.metadata.is_tearing_down() && self.pending.is_none() {
            debug!("Nothing left to persist, releasing volume lifecycle");
            state.remove_finalizer(&lifecycle_key, PERSISTENCE_OWNER)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod persistence_test;

//! Unit tests for persistence module

use super::*;
use crate::runtime::{Controller, ControllerContext, Reconciling};
use crate::test_utils::{complete_config, wait_until};
use machineconfig::loader;
use std::os::unix::fs::PermissionsExt;

const VOLUME_OWNER: &str = "block.VolumeController";

fn partial_config() -> Container {
    loader::load_from_bytes(
        "apiVersion: v1alpha1\nkind: SideroLinkConfig\napiUrl: https://siderolink.api/?jointoken=none\n",
    )
    .unwrap()
}

fn mounted(target: &Path) -> VolumeMountStatus {
    VolumeMountStatus {
        volume_id: STATE_VOLUME_ID.to_string(),
        requester: PERSISTENCE_OWNER.to_string(),
        target: target.to_path_buf(),
        read_only: false,
        detached: true,
    }
}

fn request_exists(state: &State) -> bool {
    state
        .try_get::<VolumeMountRequest>(MOUNT_REQUEST_ID)
        .unwrap()
        .is_some()
}

fn lifecycle_finalizers(state: &State) -> Vec<String> {
    state
        .metadata(&ResourceKey::of::<VolumeLifecycle>(LIFECYCLE_ID))
        .unwrap()
        .finalizers
        .into_iter()
        .collect()
}

fn unmount(state: &State) {
    let key = ResourceKey::of::<VolumeMountStatus>(MOUNT_REQUEST_ID);
    assert!(state.teardown_and_destroy(VOLUME_OWNER, &key).unwrap());
}

#[tokio::test]
async fn test_persist_and_release_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join(CONFIG_FILENAME);
    let state = State::new();
    let ctx = ControllerContext::new(state.clone());
    let handle = {
        let ctx = ctx.clone();
        tokio::spawn(async move { Reconciling(PersistenceController::new()).run(&ctx).await })
    };

    state.create(VOLUME_OWNER, LIFECYCLE_ID, VolumeLifecycle).unwrap();
    wait_until("lifecycle finalizer", || {
        lifecycle_finalizers(&state) == [PERSISTENCE_OWNER]
    })
    .await;

    // first config
    let c1 = MachineConfig::new(complete_config());
    let c1_bytes = c1.container().bytes().unwrap();
    state.create("config.Setter", PERSISTENT_ID, c1).unwrap();
    wait_until("mount request", || request_exists(&state)).await;
    let request = state.get::<VolumeMountRequest>(MOUNT_REQUEST_ID).unwrap();
    assert_eq!(request.spec.volume_id, STATE_VOLUME_ID);
    assert!(request.spec.detached);
    assert!(!file.exists());

    state
        .create(VOLUME_OWNER, MOUNT_REQUEST_ID, mounted(dir.path()))
        .unwrap();
    wait_until("first write", || !request_exists(&state)).await;
    assert_eq!(std::fs::read(&file).unwrap(), c1_bytes);
    let mode = std::fs::metadata(&file).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!dir.path().join("config.yaml-tmp").exists());
    unmount(&state);

    // second config, lifecycle torn down before the mount shows up
    state
        .update("config.Setter", PERSISTENT_ID, MachineConfig::new(partial_config()))
        .unwrap();
    wait_until("second mount request", || request_exists(&state)).await;

    let lifecycle_key = ResourceKey::of::<VolumeLifecycle>(LIFECYCLE_ID);
    assert!(!state.teardown(VOLUME_OWNER, &lifecycle_key).unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(lifecycle_finalizers(&state), [PERSISTENCE_OWNER]);

    state
        .create(VOLUME_OWNER, MOUNT_REQUEST_ID, mounted(dir.path()))
        .unwrap();
    wait_until("lifecycle released", || lifecycle_finalizers(&state).is_empty()).await;

    let contents = std::fs::read_to_string(&file).unwrap();
    assert!(contents.contains("jointoken=none"), "{}", contents);
    assert!(!request_exists(&state));
    state.destroy(VOLUME_OWNER, &lifecycle_key).unwrap();

    ctx.cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_idle_without_lifecycle() {
    let state = State::new();
    state
        .create("config.Setter", PERSISTENT_ID, MachineConfig::new(complete_config()))
        .unwrap();

    let mut controller = PersistenceController::new();
    controller.reconcile(&state).await.unwrap();

    assert!(!request_exists(&state));
    assert_eq!(controller.persisted_version(), 0);
}

#[tokio::test]
async fn test_failed_write_keeps_pending() {
    let dir = tempfile::tempdir().unwrap();
    let state = State::new();
    state.create(VOLUME_OWNER, LIFECYCLE_ID, VolumeLifecycle).unwrap();
    state
        .create("config.Setter", PERSISTENT_ID, MachineConfig::new(complete_config()))
        .unwrap();
    state
        .create(VOLUME_OWNER, MOUNT_REQUEST_ID, mounted(&dir.path().join("missing")))
        .unwrap();

    let mut controller = PersistenceController::new();
    controller.reconcile(&state).await.unwrap();
    assert_eq!(controller.persisted_version(), 0);

    // the status finalizer is released even though the write failed
    let status = state
        .metadata(&ResourceKey::of::<VolumeMountStatus>(MOUNT_REQUEST_ID))
        .unwrap();
    assert!(status.finalizers.is_empty());

    std::fs::create_dir(dir.path().join("missing")).unwrap();
    controller.reconcile(&state).await.unwrap();
    assert_eq!(controller.persisted_version(), 1);
    assert!(dir.path().join("missing").join(CONFIG_FILENAME).exists());
}

#[tokio::test]
async fn test_write_atomically_replaces_file() {
    let dir = tempfile::tempdir().unwrap();
    write_atomically(dir.path(), b"one").await.unwrap();
    write_atomically(dir.path(), b"two").await.unwrap();

    assert_eq!(std::fs::read(dir.path().join(CONFIG_FILENAME)).unwrap(), b"two");
    assert!(!dir.path().join("config.yaml-tmp").exists());
}

#[tokio::test]
async fn test_write_atomically_removes_tmp_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    // a non-empty directory in place of the target makes the rename fail
    let target = dir.path().join(CONFIG_FILENAME);
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("keep"), b"x").unwrap();

    write_atomically(dir.path(), b"one").await.unwrap_err();

    assert!(!dir.path().join("config.yaml-tmp").exists());
    assert!(target.join("keep").exists());
}

//! Unit tests for acquire module

use super::*;
use crate::events::PlatformEventType;
use crate::test_utils::{
    RecordingConfigSetter, RecordingEvents, RecordingPlatformEvents, SIDEROLINK_ONLY_CONFIG, complete_config,
    complete_config_bytes, wait_until,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use platform::MockPlatform;
use std::io::Write;
use tokio::task::JoinHandle;

struct Harness {
    state: State,
    ctx: ControllerContext,
    platform_events: RecordingPlatformEvents,
    events: RecordingEvents,
    setter: RecordingConfigSetter,
    _dir: tempfile::TempDir,
}

fn harness(disk: Option<&[u8]>, platform: MockPlatform) -> (Harness, AcquireController) {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("config.yaml");
    if let Some(disk) = disk {
        std::fs::write(&state_path, disk).unwrap();
    }

    let state = State::new();
    let platform_events = RecordingPlatformEvents::default();
    let events = RecordingEvents::default();
    let setter = RecordingConfigSetter::default();
    let controller = AcquireController::new(
        Arc::new(platform),
        Arc::new(platform_events.clone()),
        Arc::new(events.clone()),
        Arc::new(setter.clone()),
        state_path,
        ValidationMode::metal(),
    );
    state.create("test", ACQUIRE_ID, AcquireConfigSpec).unwrap();

    let harness = Harness {
        ctx: ControllerContext::new(state.clone()),
        state,
        platform_events,
        events,
        setter,
        _dir: dir,
    };
    (harness, controller)
}

fn spawn(
    controller: AcquireController,
    ctx: &ControllerContext,
) -> JoinHandle<(AcquireController, Result<(), ControllerError>)> {
    let ctx = ctx.clone();
    let mut controller = controller;
    tokio::spawn(async move {
        let result = controller.run(&ctx).await;
        (controller, result)
    })
}

fn kinds(events: &[PlatformEvent]) -> Vec<PlatformEventType> {
    events.iter().map(|e| e.kind).collect()
}

async fn wait_for_status(h: &Harness) {
    wait_until("AcquireConfigStatus", || {
        h.state.try_get::<AcquireConfigStatus>(ACQUIRE_ID).unwrap().is_some()
    })
    .await;
}

#[tokio::test]
async fn test_disk_complete() {
    let platform = MockPlatform::without_config();
    let (h, controller) = harness(Some(&complete_config_bytes()), platform.clone());
    let handle = spawn(controller, &h.ctx);

    wait_for_status(&h).await;
    h.ctx.cancel.cancel();
    let (controller, result) = handle.await.unwrap();
    result.unwrap();

    assert_eq!(kinds(&h.platform_events.events()), vec![PlatformEventType::ConfigLoaded]);
    assert!(h.events.events().is_empty());
    let configs = h.setter.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].cluster_name(), Some("cluster-X"));
    assert_eq!(controller.source_trail(), ["state"]);
    assert_eq!(platform.calls(), 0);
}

#[tokio::test]
async fn test_disk_corrupt() {
    let mut corrupt = b"aaa".to_vec();
    corrupt.extend(complete_config_bytes());
    let (h, mut controller) = harness(Some(&corrupt), MockPlatform::without_config());

    let err = controller.run(&h.ctx).await.unwrap_err();
    assert!(err.to_string().contains("unknown keys found during decoding"), "{}", err);

    let platform_events = h.platform_events.events();
    assert_eq!(kinds(&platform_events), vec![PlatformEventType::Failure]);
    assert_eq!(platform_events[0].message, "Error loading and validating Talos machine config.");
    assert_eq!(platform_events[0].error.as_deref(), Some(err.to_string().as_str()));
    assert_eq!(
        h.events.events(),
        vec![RuntimeEvent::ConfigLoadError { error: err.to_string() }]
    );
    assert!(h.setter.configs().is_empty());
}

#[tokio::test]
async fn test_disk_partial_then_maintenance() {
    let (h, controller) = harness(Some(SIDEROLINK_ONLY_CONFIG.as_bytes()), MockPlatform::without_config());
    let handle = spawn(controller, &h.ctx);

    wait_until("maintenance request", || {
        h.state
            .try_get::<MaintenanceServiceRequest>(MAINTENANCE_SERVICE_ID)
            .unwrap()
            .is_some()
    })
    .await;

    let configs = h.setter.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(
        configs[0].siderolink().and_then(|s| s.host()).as_deref(),
        Some("siderolink.api")
    );
    assert_eq!(
        h.events.events(),
        vec![RuntimeEvent::Task {
            task: "runningMaintenance".to_string(),
            action: TaskAction::Start,
        }]
    );

    h.state
        .create("maintenance.Service", MAINTENANCE_ID, MachineConfig::new(complete_config()))
        .unwrap();
    wait_for_status(&h).await;

    let configs = h.setter.configs();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[1].cluster_name(), Some("cluster-X"));
    assert_eq!(
        h.events.events().last(),
        Some(&RuntimeEvent::Task {
            task: "runningMaintenance".to_string(),
            action: TaskAction::Stop,
        })
    );
    assert_eq!(
        kinds(&h.platform_events.events()),
        vec![PlatformEventType::Activate, PlatformEventType::ConfigLoaded]
    );
    assert!(h
        .state
        .try_get::<MaintenanceServiceRequest>(MAINTENANCE_SERVICE_ID)
        .unwrap()
        .is_none());

    h.ctx.cancel.cancel();
    let (controller, result) = handle.await.unwrap();
    result.unwrap();
    assert_eq!(controller.source_trail(), ["state", "maintenance"]);
}

#[tokio::test]
async fn test_maintenance_incomplete_then_complete() {
    let (h, controller) = harness(None, MockPlatform::without_config());
    let handle = spawn(controller, &h.ctx);

    wait_until("maintenance request", || {
        h.state
            .try_get::<MaintenanceServiceRequest>(MAINTENANCE_SERVICE_ID)
            .unwrap()
            .is_some()
    })
    .await;
    assert!(h.setter.configs().is_empty());

    let partial = loader::load_from_bytes(SIDEROLINK_ONLY_CONFIG).unwrap();
    h.state
        .create("maintenance.Service", MAINTENANCE_ID, MachineConfig::new(partial))
        .unwrap();
    wait_until("partial config applied", || h.setter.configs().len() == 1).await;

    let configs = h.setter.configs();
    assert_eq!(
        configs[0].siderolink().and_then(|s| s.host()).as_deref(),
        Some("siderolink.api")
    );
    assert!(h.state.try_get::<AcquireConfigStatus>(ACQUIRE_ID).unwrap().is_none());
    assert!(h
        .state
        .try_get::<MaintenanceServiceRequest>(MAINTENANCE_SERVICE_ID)
        .unwrap()
        .is_some());
    assert_eq!(
        h.events.events(),
        vec![RuntimeEvent::Task {
            task: "runningMaintenance".to_string(),
            action: TaskAction::Start,
        }]
    );
    assert_eq!(kinds(&h.platform_events.events()), vec![PlatformEventType::Activate]);

    h.state
        .update("maintenance.Service", MAINTENANCE_ID, MachineConfig::new(complete_config()))
        .unwrap();
    wait_for_status(&h).await;

    let configs = h.setter.configs();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[1].cluster_name(), Some("cluster-X"));
    assert_eq!(
        h.events.events().last(),
        Some(&RuntimeEvent::Task {
            task: "runningMaintenance".to_string(),
            action: TaskAction::Stop,
        })
    );
    assert_eq!(
        kinds(&h.platform_events.events()),
        vec![PlatformEventType::Activate, PlatformEventType::ConfigLoaded]
    );

    h.ctx.cancel.cancel();
    let (controller, result) = handle.await.unwrap();
    result.unwrap();
    assert_eq!(controller.source_trail(), ["maintenance", "maintenance"]);
}

#[tokio::test]
async fn test_platform_gzip() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&complete_config_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let (h, controller) = harness(None, MockPlatform::with_config(compressed));
    let handle = spawn(controller, &h.ctx);

    wait_for_status(&h).await;
    h.ctx.cancel.cancel();
    let (controller, result) = handle.await.unwrap();
    result.unwrap();

    assert_eq!(controller.source_trail(), ["mock"]);
    assert_eq!(kinds(&h.platform_events.events()), vec![PlatformEventType::ConfigLoaded]);
    let configs = h.setter.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].cluster_name(), Some("cluster-X"));
}

#[tokio::test]
async fn test_platform_error() {
    let (h, mut controller) = harness(None, MockPlatform::with_error("mock error"));

    let err = controller.run(&h.ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "error acquiring via platform mock: mock error");

    let platform_events = h.platform_events.events();
    assert_eq!(kinds(&platform_events), vec![PlatformEventType::Failure]);
    assert_eq!(
        platform_events[0].error.as_deref(),
        Some("error acquiring via platform mock: mock error")
    );
    assert_eq!(
        h.events.events(),
        vec![RuntimeEvent::ConfigLoadError {
            error: "error acquiring via platform mock: mock error".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_platform_without_config_enters_maintenance() {
    let (h, mut controller) = harness(None, MockPlatform::without_config());

    let disk = controller.step(&h.state, AcquireState::Disk).await.unwrap();
    assert_eq!(disk.next, Some(AcquireState::Platform));
    assert!(disk.config.is_none());

    let platform = controller.step(&h.state, AcquireState::Platform).await.unwrap();
    assert_eq!(platform.next, Some(AcquireState::MaintenanceEnter));
    assert!(platform.config.is_none());
}

#[tokio::test]
async fn test_every_state_has_a_transition() {
    let (h, mut controller) = harness(None, MockPlatform::without_config());

    for current in [
        AcquireState::Disk,
        AcquireState::Platform,
        AcquireState::MaintenanceEnter,
        AcquireState::Maintenance,
        AcquireState::MaintenanceLeave,
        AcquireState::Done,
        AcquireState::Final,
    ] {
        let transition = controller.step(&h.state, current).await.unwrap();
        if let Some(next) = transition.next {
            assert_ne!(next, current, "{:?} must not loop onto itself", current);
        }
    }
    // Final absorbs everything.
    assert!(controller.step(&h.state, AcquireState::Final).await.unwrap().next.is_none());
}

#[tokio::test]
async fn test_waits_for_acquire_spec() {
    let (h, controller) = harness(Some(&complete_config_bytes()), MockPlatform::without_config());
    let key = resources::ResourceKey::of::<AcquireConfigSpec>(ACQUIRE_ID);
    assert!(h.state.teardown_and_destroy("test", &key).unwrap());

    let handle = spawn(controller, &h.ctx);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.setter.configs().is_empty());

    h.state.create("test", ACQUIRE_ID, AcquireConfigSpec).unwrap();
    wait_for_status(&h).await;

    h.ctx.cancel.cancel();
    handle.await.unwrap().1.unwrap();
}

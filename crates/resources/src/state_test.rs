//! Unit tests for state module

use super::*;

#[derive(Debug, Clone, PartialEq, Default)]
struct TestSpec {
    value: String,
}

impl ResourceSpec for TestSpec {
    const TYPE: &'static str = "Tests.test.talos.dev";
    const NAMESPACE: &'static str = "test";
}

#[derive(Debug, Clone, PartialEq, Default)]
struct OtherSpec;

impl ResourceSpec for OtherSpec {
    const TYPE: &'static str = "Others.test.talos.dev";
    const NAMESPACE: &'static str = "test";
}

fn spec(value: &str) -> TestSpec {
    TestSpec {
        value: value.to_string(),
    }
}

#[test]
fn test_create_get_list() {
    let state = State::new();
    state.create("owner", "b", spec("2")).unwrap();
    state.create("owner", "a", spec("1")).unwrap();
    state.create("owner", "a", OtherSpec).unwrap();

    let a = state.get::<TestSpec>("a").unwrap();
    assert_eq!(a.spec, spec("1"));
    assert_eq!(a.version(), 1);
    assert_eq!(a.metadata.owner, "owner");

    let ids: Vec<String> = state
        .list::<TestSpec>()
        .unwrap()
        .into_iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    assert!(matches!(
        state.create("owner", "a", spec("1")),
        Err(StateError::AlreadyExists(_))
    ));
    assert!(state.get::<TestSpec>("c").unwrap_err().is_not_found());
    assert!(state.try_get::<TestSpec>("c").unwrap().is_none());
}

#[test]
fn test_update_bumps_version_on_change_only() {
    let state = State::new();
    state.create("owner", "a", spec("1")).unwrap();

    assert_eq!(state.update("owner", "a", spec("1")).unwrap().version(), 1);
    assert_eq!(state.update("owner", "a", spec("2")).unwrap().version(), 2);
    assert_eq!(state.modify("owner", "a", spec("2")).unwrap().version(), 2);
    assert_eq!(state.modify("owner", "b", spec("x")).unwrap().version(), 1);

    let r = state
        .modify_with::<TestSpec, _>("owner", "a", |s| s.value.push('!'))
        .unwrap();
    assert_eq!(r.spec, spec("2!"));
    assert_eq!(r.version(), 3);
}

#[test]
fn test_owner_conflict() {
    let state = State::new();
    state.create("owner", "a", spec("1")).unwrap();

    let err = state.update("intruder", "a", spec("2")).unwrap_err();
    assert!(matches!(err, StateError::OwnerConflict { .. }), "{}", err);
    let key = ResourceKey::of::<TestSpec>("a");
    assert!(state.teardown("intruder", &key).is_err());
    assert!(state.destroy("intruder", &key).is_err());
}

#[test]
fn test_teardown_waits_for_finalizers() {
    let state = State::new();
    state.create("owner", "a", spec("1")).unwrap();
    let key = ResourceKey::of::<TestSpec>("a");

    state.add_finalizer(&key, "persist").unwrap();
    state.add_finalizer(&key, "persist").unwrap();
    assert!(!state.teardown("owner", &key).unwrap());
    assert!(state.get::<TestSpec>("a").unwrap().metadata.is_tearing_down());
    assert!(matches!(
        state.update("owner", "a", spec("2")),
        Err(StateError::PhaseConflict(_))
    ));
    assert!(matches!(
        state.destroy("owner", &key),
        Err(StateError::FinalizersPending { .. })
    ));
    assert!(!state.teardown_and_destroy("owner", &key).unwrap());

    state.remove_finalizer(&key, "persist").unwrap();
    assert!(state.teardown_and_destroy("owner", &key).unwrap());
    assert!(state.try_get::<TestSpec>("a").unwrap().is_none());
    assert!(state.teardown_and_destroy("owner", &key).unwrap());
}

#[tokio::test]
async fn test_watch_events() {
    let state = State::new();
    let mut events = state.watch();

    state.create("owner", "a", spec("1")).unwrap();
    state.update("owner", "a", spec("1")).unwrap();
    state.update("owner", "a", spec("2")).unwrap();
    let key = ResourceKey::of::<TestSpec>("a");
    state.teardown_and_destroy("owner", &key).unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.key, key);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::Created,
            EventKind::Updated,
            EventKind::TearingDown,
            EventKind::Destroyed
        ]
    );
}

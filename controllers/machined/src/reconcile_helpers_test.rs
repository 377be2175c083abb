//! Unit tests for reconcile_helpers module

use super::*;
use resources::runtime::Diagnostic;

fn diagnostic(message: &str) -> Diagnostic {
    Diagnostic {
        message: message.to_string(),
        details: Vec::new(),
    }
}

#[test]
fn test_untouched_outputs_are_destroyed() {
    let state = State::new();
    let mut first = Outputs::new(&state, "test.Owner");
    first.modify("a", diagnostic("a")).unwrap();
    first.modify("b", diagnostic("b")).unwrap();
    first.cleanup::<Diagnostic>().unwrap();

    let mut second = Outputs::new(&state, "test.Owner");
    second.modify("a", diagnostic("a")).unwrap();
    assert!(second.touched::<Diagnostic>("a"));
    assert!(!second.touched::<Diagnostic>("b"));
    second.cleanup::<Diagnostic>().unwrap();

    let ids: Vec<String> = state
        .list::<Diagnostic>()
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(ids, vec!["a"]);
}

#[test]
fn test_kept_outputs_survive() {
    let state = State::new();
    state.create("test.Owner", "a", diagnostic("a")).unwrap();

    let mut outputs = Outputs::new(&state, "test.Owner");
    outputs.keep::<Diagnostic>("a");
    outputs.cleanup::<Diagnostic>().unwrap();

    assert!(state.try_get::<Diagnostic>("a").unwrap().is_some());
}

#[test]
fn test_cleanup_ignores_other_owners() {
    let state = State::new();
    state.create("someone.Else", "theirs", diagnostic("x")).unwrap();

    destroy_all::<Diagnostic>(&state, "test.Owner").unwrap();

    assert!(state.try_get::<Diagnostic>("theirs").unwrap().is_some());
}

#[test]
fn test_cleanup_waits_for_finalizers() {
    let state = State::new();
    let created = state.create("test.Owner", "a", diagnostic("a")).unwrap();
    state.add_finalizer(&created.metadata.key, "consumer").unwrap();

    destroy_all::<Diagnostic>(&state, "test.Owner").unwrap();
    let held = state.get::<Diagnostic>("a").unwrap();
    assert!(held.metadata.is_tearing_down());

    state.remove_finalizer(&created.metadata.key, "consumer").unwrap();
    destroy_all::<Diagnostic>(&state, "test.Owner").unwrap();
    assert!(state.try_get::<Diagnostic>("a").unwrap().is_none());
}

#[test]
fn test_unchanged_modify_keeps_version() {
    let state = State::new();
    let mut outputs = Outputs::new(&state, "test.Owner");
    let first = outputs.modify("a", diagnostic("a")).unwrap();
    let second = outputs.modify("a", diagnostic("a")).unwrap();
    assert_eq!(first.version(), second.version());
}

//! In-memory resource state.
//!
//! A typed key-value store with change notifications. Every resource records
//! the controller that created it; only that owner may update, tear down, or
//! destroy it. Finalizers can be added and removed by anyone and block
//! destruction until released.

use crate::error::StateError;
use crate::resource::{Metadata, Phase, Resource, ResourceKey, ResourceSpec};
use chrono::Utc;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 1024;

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Resource created
    Created,
    /// Spec changed
    Updated,
    /// Finalizers changed
    Finalizers,
    /// Teardown started
    TearingDown,
    /// Resource removed
    Destroyed,
}

/// Change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Changed resource
    pub key: ResourceKey,
    /// Kind of change
    pub kind: EventKind,
    /// Version after the change
    pub version: u64,
}

struct Entry {
    metadata: Metadata,
    spec: Arc<dyn Any + Send + Sync>,
}

/// Shared resource state; clones share the same store.
#[derive(Clone)]
pub struct State {
    resources: Arc<RwLock<BTreeMap<ResourceKey, Entry>>>,
    events: broadcast::Sender<Event>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_list().entries(resources.keys()).finish()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

fn typed<T: ResourceSpec>(entry: &Entry) -> Result<Resource<T>, StateError> {
    let spec = entry
        .spec
        .downcast_ref::<T>()
        .ok_or_else(|| StateError::TypeMismatch(entry.metadata.key.to_string()))?;
    Ok(Resource {
        metadata: entry.metadata.clone(),
        spec: spec.clone(),
    })
}

fn check_owner(entry: &Entry, caller: &str) -> Result<(), StateError> {
    if entry.metadata.owner != caller {
        return Err(StateError::OwnerConflict {
            key: entry.metadata.key.to_string(),
            owner: entry.metadata.owner.clone(),
            caller: caller.to_string(),
        });
    }
    Ok(())
}

impl State {
    /// Empty state.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resources: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn watch(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn notify(&self, key: &ResourceKey, kind: EventKind, version: u64) {
        debug!("Resource {} {:?} (version {})", key, kind, version);
        // No subscribers is not an error.
        let _ = self.events.send(Event {
            key: key.clone(),
            kind,
            version,
        });
    }

    /// Resource `id` of type `T`.
    pub fn get<T: ResourceSpec>(&self, id: &str) -> Result<Resource<T>, StateError> {
        let key = ResourceKey::of::<T>(id);
        let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
        let entry = resources
            .get(&key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        typed(entry)
    }

    /// Resource `id` of type `T`, `None` if absent.
    pub fn try_get<T: ResourceSpec>(&self, id: &str) -> Result<Option<Resource<T>>, StateError> {
        match self.get(id) {
            Ok(resource) => Ok(Some(resource)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every resource of type `T`, sorted by ID.
    pub fn list<T: ResourceSpec>(&self) -> Result<Vec<Resource<T>>, StateError> {
        let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
        resources
            .iter()
            .filter(|(key, _)| key.is::<T>())
            .map(|(_, entry)| typed(entry))
            .collect()
    }

    /// Metadata of any resource.
    pub fn metadata(&self, key: &ResourceKey) -> Result<Metadata, StateError> {
        let resources = self.resources.read().unwrap_or_else(PoisonError::into_inner);
        resources
            .get(key)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    /// Creates resource `id` owned by `owner`.
    pub fn create<T: ResourceSpec>(&self, owner: &str, id: &str, spec: T) -> Result<Resource<T>, StateError> {
        let key = ResourceKey::of::<T>(id);
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        if resources.contains_key(&key) {
            return Err(StateError::AlreadyExists(key.to_string()));
        }
        let now = Utc::now();
        let metadata = Metadata {
            key: key.clone(),
            version: 1,
            owner: owner.to_string(),
            phase: Phase::Running,
            finalizers: BTreeSet::new(),
            created: now,
            updated: now,
        };
        resources.insert(
            key.clone(),
            Entry {
                metadata: metadata.clone(),
                spec: Arc::new(spec.clone()),
            },
        );
        drop(resources);
        self.notify(&key, EventKind::Created, 1);
        Ok(Resource { metadata, spec })
    }

    /// Replaces the spec of resource `id`.
    ///
    /// The version only moves when the spec actually changes.
    pub fn update<T: ResourceSpec>(&self, owner: &str, id: &str, spec: T) -> Result<Resource<T>, StateError> {
        let key = ResourceKey::of::<T>(id);
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        let entry = resources
            .get_mut(&key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        check_owner(entry, owner)?;
        if entry.metadata.is_tearing_down() {
            return Err(StateError::PhaseConflict(key.to_string()));
        }

        let current = entry
            .spec
            .downcast_ref::<T>()
            .ok_or_else(|| StateError::TypeMismatch(key.to_string()))?;
        if *current == spec {
            return typed(entry);
        }

        entry.spec = Arc::new(spec.clone());
        entry.metadata.version += 1;
        entry.metadata.updated = Utc::now();
        let metadata = entry.metadata.clone();
        drop(resources);
        self.notify(&key, EventKind::Updated, metadata.version);
        Ok(Resource { metadata, spec })
    }

    /// Creates or updates resource `id`.
    pub fn modify<T: ResourceSpec>(&self, owner: &str, id: &str, spec: T) -> Result<Resource<T>, StateError> {
        match self.update(owner, id, spec.clone()) {
            Err(e) if e.is_not_found() => self.create(owner, id, spec),
            other => other,
        }
    }

    /// Creates or updates resource `id` by mutating its current spec, or
    /// the default spec when absent.
    pub fn modify_with<T, F>(&self, owner: &str, id: &str, f: F) -> Result<Resource<T>, StateError>
    where
        T: ResourceSpec + Default,
        F: FnOnce(&mut T),
    {
        let mut spec = self
            .try_get::<T>(id)?
            .map(|r| r.spec)
            .unwrap_or_default();
        f(&mut spec);
        self.modify(owner, id, spec)
    }

    /// Starts teardown of a resource.
    ///
    /// Returns true when no finalizers remain and the resource can be destroyed.
    pub fn teardown(&self, owner: &str, key: &ResourceKey) -> Result<bool, StateError> {
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        let entry = resources
            .get_mut(key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        check_owner(entry, owner)?;
        let ready = entry.metadata.finalizers.is_empty();
        if entry.metadata.is_tearing_down() {
            return Ok(ready);
        }
        entry.metadata.phase = Phase::TearingDown;
        let version = entry.metadata.version;
        drop(resources);
        self.notify(key, EventKind::TearingDown, version);
        Ok(ready)
    }

    /// Removes a resource; fails while finalizers remain.
    pub fn destroy(&self, owner: &str, key: &ResourceKey) -> Result<(), StateError> {
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        let entry = resources
            .get(key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        check_owner(entry, owner)?;
        if !entry.metadata.finalizers.is_empty() {
            return Err(StateError::FinalizersPending {
                key: key.to_string(),
                finalizers: entry.metadata.finalizers.iter().cloned().collect(),
            });
        }
        let version = entry.metadata.version;
        resources.remove(key);
        drop(resources);
        self.notify(key, EventKind::Destroyed, version);
        Ok(())
    }

    /// Tears down and, if no finalizers block it, destroys a resource.
    ///
    /// Returns true once the resource is gone. A missing resource counts as
    /// gone.
    pub fn teardown_and_destroy(&self, owner: &str, key: &ResourceKey) -> Result<bool, StateError> {
        match self.teardown(owner, key) {
            Ok(true) => self.destroy(owner, key).map(|()| true),
            Ok(false) => Ok(false),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Adds a finalizer; adding an existing finalizer is a no-op.
    pub fn add_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<(), StateError> {
        self.change_finalizers(key, |finalizers| finalizers.insert(finalizer.to_string()))
    }

    /// Removes a finalizer; removing an absent finalizer is a no-op.
    pub fn remove_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<(), StateError> {
        self.change_finalizers(key, |finalizers| finalizers.remove(finalizer))
    }

    fn change_finalizers(
        &self,
        key: &ResourceKey,
        f: impl FnOnce(&mut BTreeSet<String>) -> bool,
    ) -> Result<(), StateError> {
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        let entry = resources
            .get_mut(key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        if !f(&mut entry.metadata.finalizers) {
            return Ok(());
        }
        let version = entry.metadata.version;
        drop(resources);
        self.notify(key, EventKind::Finalizers, version);
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

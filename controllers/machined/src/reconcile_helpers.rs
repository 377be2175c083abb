//! Helper functions for common reconciliation patterns
//!
//! Derivation controllers write their outputs through [`Outputs`], which
//! records every resource touched during a pass. At the end of the pass
//! [`Outputs::cleanup`] tears down and destroys the controller's resources
//! that were not touched, so outputs that no longer apply disappear.

use crate::error::ControllerError;
use resources::{Resource, ResourceKey, ResourceSpec, State};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Output writer for one reconcile pass.
#[derive(Debug)]
pub struct Outputs<'a> {
    state: &'a State,
    owner: &'a str,
    touched: BTreeSet<ResourceKey>,
}

impl<'a> Outputs<'a> {
    /// Start a pass for `owner`.
    pub fn new(state: &'a State, owner: &'a str) -> Self {
        Self {
            state,
            owner,
            touched: BTreeSet::new(),
        }
    }

    /// Create or update output `id`.
    pub fn modify<T: ResourceSpec>(&mut self, id: &str, spec: T) -> Result<Resource<T>, ControllerError> {
        self.touched.insert(ResourceKey::of::<T>(id));
        Ok(self.state.modify(self.owner, id, spec)?)
    }

    /// Keep output `id` as it is.
    pub fn keep<T: ResourceSpec>(&mut self, id: &str) {
        self.touched.insert(ResourceKey::of::<T>(id));
    }

    /// Whether output `id` was written in this pass.
    pub fn touched<T: ResourceSpec>(&self, id: &str) -> bool {
        self.touched.contains(&ResourceKey::of::<T>(id))
    }

    /// Remove every `T` owned by this controller that was not touched.
    ///
    /// Resources held by finalizers stay in teardown until released; they
    /// are destroyed by a later pass.
    pub fn cleanup<T: ResourceSpec>(&self) -> Result<(), ControllerError> {
        for resource in self.state.list::<T>()? {
            if resource.metadata.owner != self.owner || self.touched.contains(&resource.metadata.key) {
                continue;
            }

            if self.state.teardown_and_destroy(self.owner, &resource.metadata.key)? {
                info!("Destroyed {}", resource.metadata.key);
            } else {
                debug!("{} is waiting for finalizers", resource.metadata.key);
            }
        }
        Ok(())
    }
}

/// Tear down and destroy every `T` owned by `owner`.
pub fn destroy_all<T: ResourceSpec>(state: &State, owner: &str) -> Result<(), ControllerError> {
    Outputs::new(state, owner).cleanup::<T>()
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod reconcile_helpers_test;

//! Resource state errors

use thiserror::Error;

/// Errors raised by [`crate::State`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The resource does not exist
    #[error("resource {0} doesn't exist")]
    NotFound(String),

    /// A resource with the same key exists
    #[error("resource {0} already exists")]
    AlreadyExists(String),

    /// The caller is not the owner recorded at creation
    #[error("resource {key} is owned by {owner:?}, not {caller:?}")]
    OwnerConflict {
        /// Resource key
        key: String,
        /// Recorded owner
        owner: String,
        /// Caller
        caller: String,
    },

    /// The resource is being torn down and cannot be updated
    #[error("resource {0} is tearing down")]
    PhaseConflict(String),

    /// Destroy was attempted while finalizers remain
    #[error("resource {key} has pending finalizers: {finalizers:?}")]
    FinalizersPending {
        /// Resource key
        key: String,
        /// Remaining finalizers
        finalizers: Vec<String>,
    },

    /// The stored spec is of a different type than requested
    #[error("resource {0} has an unexpected type")]
    TypeMismatch(String),
}

impl StateError {
    /// Whether the error only signals an absent resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}

//! Resource metadata and the typed resource wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A typed resource spec.
pub trait ResourceSpec: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Resource type name (`MachineConfigs.config.talos.dev`)
    const TYPE: &'static str;

    /// Namespace the resource lives in
    const NAMESPACE: &'static str;
}

/// Address of a resource in the state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource type
    pub resource_type: String,
    /// Namespace
    pub namespace: String,
    /// ID within the namespace
    pub id: String,
}

impl ResourceKey {
    /// Key of a `T` with `id` in its default namespace.
    pub fn of<T: ResourceSpec>(id: impl Into<String>) -> Self {
        Self {
            resource_type: T::TYPE.to_string(),
            namespace: T::NAMESPACE.to_string(),
            id: id.into(),
        }
    }

    /// Whether the key addresses a `T`.
    pub fn is<T: ResourceSpec>(&self) -> bool {
        self.resource_type == T::TYPE && self.namespace == T::NAMESPACE
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.resource_type, self.id)
    }
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Regular state
    #[default]
    Running,
    /// Torn down, waiting for finalizers to be released
    TearingDown,
}

/// Metadata tracked for every resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Address
    pub key: ResourceKey,
    /// Incremented on every spec change, starting at 1
    pub version: u64,
    /// Controller that created the resource
    pub owner: String,
    /// Lifecycle phase
    pub phase: Phase,
    /// Finalizers blocking destruction
    pub finalizers: BTreeSet<String>,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Time of the last spec change
    pub updated: DateTime<Utc>,
}

impl Metadata {
    /// ID of the resource.
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Whether the resource is being torn down.
    pub fn is_tearing_down(&self) -> bool {
        self.phase == Phase::TearingDown
    }
}

/// Snapshot of a typed resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource<T> {
    /// Metadata
    pub metadata: Metadata,
    /// Typed spec
    pub spec: T,
}

impl<T> Resource<T> {
    /// ID of the resource.
    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    /// Version of the resource.
    pub fn version(&self) -> u64 {
        self.metadata.version
    }
}

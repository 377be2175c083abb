//! Node Resources
//!
//! Typed resources exchanged between node controllers, and the in-memory
//! [`State`] they live in. Every resource has a single owner; only the owner
//! may update, tear down or destroy it. Other controllers attach finalizers to
//! keep a resource alive while they still depend on it.
//!
//! Resource groups:
//! - `config`: machine configuration, machine type, acquisition handshake
//! - `block`: volume lifecycle and mount requests
//! - `k8s`: control-plane component configuration
//! - `network`: node addresses, links, address specs
//! - `siderolink`: management link configuration and health
//! - `runtime`: diagnostics and node identity

pub mod block;
pub mod config;
pub mod error;
pub mod k8s;
pub mod network;
pub mod resource;
pub mod runtime;
pub mod siderolink;
pub mod state;

pub use error::StateError;
pub use resource::{Metadata, Phase, Resource, ResourceKey, ResourceSpec};
pub use state::{Event, EventKind, State};

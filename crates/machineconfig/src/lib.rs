//! Machine Configuration Documents
//!
//! Typed, self-describing configuration documents for cluster nodes, and the
//! machinery around them:
//!
//! - `registry`: maps `(kind, apiVersion)` to a decoder for the concrete type
//! - `document`: the `Document` trait and its optional capabilities
//!   (validation, conflicts, redaction, merge keys, visitors)
//! - `container`: an ordered set of documents forming one machine configuration
//! - `loader`: multi-document YAML decoding with unknown-key rejection
//! - `encoder`: canonical YAML rendering, optionally with inline documentation
//! - `types`: every registered document kind
//!
//! # Example
//!
//! ```no_run
//! use machineconfig::{loader, ValidationMode};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let container = loader::load_from_file("/system/state/config.yaml")?;
//! let warnings = container.validate(&ValidationMode::disk())?;
//! for warning in warnings {
//!     println!("warning: {}", warning);
//! }
//! println!("complete: {}", container.is_complete_for_boot());
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod container;
pub mod document;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod merge;
pub mod net;
pub mod registry;
pub mod selector;
pub mod types;

pub use container::Container;
pub use document::{
    ConflictClass, Document, DocumentSpec, DocumentVisitor, FieldValue, RuntimeContext,
    ValidationMode, ValidationReport,
};
pub use encoder::{CommentsFlags, EncoderOptions};
pub use error::{ContainerError, DecodeError, LoadError, ValidationError};
pub use registry::Registry;
pub use types::v1alpha1::MachineType;

//! Machine configuration errors

use std::fmt;
use thiserror::Error;

/// Errors raised while decoding a single YAML document into a typed document.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// YAML syntax or type mismatch
    #[error("yaml decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document carried keys that the registered type does not know about.
    ///
    /// The payload is the offending YAML fragment.
    #[error("unknown keys found during decoding:\n{0}")]
    UnknownKeys(String),

    /// The document is not a YAML mapping
    #[error("document is not a mapping: {0}")]
    NotAMapping(String),

    /// `kind` or `apiVersion` has the wrong type
    #[error("invalid document header: {0}")]
    InvalidHeader(String),

    /// A `$patch: delete` document was found but tombstones are not enabled
    #[error("patch delete documents are not allowed here (kind {kind:?})")]
    PatchDeleteNotAllowed {
        /// Kind named by the tombstone
        kind: String,
    },
}

/// Errors raised by the loader.
#[derive(Debug, Error)]
pub enum LoadError {
    /// I/O error reading the source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A document failed to decode
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// The stream contained no documents
    #[error("no configuration documents found")]
    NoConfig,

    /// The source exceeds the size limit
    #[error("configuration is too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Size of the input
        size: usize,
        /// Maximum accepted size
        limit: usize,
    },

    /// The decoded documents do not form a valid container
    #[error("{0}")]
    Container(#[from] ContainerError),
}

/// Errors raised when documents are assembled into a container.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Two documents share `(kind, name)`
    #[error("duplicate document: kind {kind:?}, name {name:?}")]
    Duplicate {
        /// Kind of the duplicated document
        kind: String,
        /// Name of the duplicated document (empty for unnamed kinds)
        name: String,
    },

    /// A second legacy monolithic document was found
    #[error("only a single v1alpha1 document is allowed")]
    DuplicateLegacy,

    /// Merge input could not be re-decoded
    #[error("merge failed: {0}")]
    Merge(String),
}

/// A multi-error produced by validation.
///
/// Every entry is a self-contained message; `Display` joins them with
/// newlines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    errors: Vec<String>,
}

impl ValidationError {
    /// Creates a validation error from a list of messages.
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single message.
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    /// Individual error messages.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Returns true if no errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.join("\n"))
    }
}

impl std::error::Error for ValidationError {}

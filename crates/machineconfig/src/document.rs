//! Document trait and capabilities.
//!
//! Concrete kinds implement `DocumentSpec`, which is statically typed and
//! carries defaults for every optional capability. A blanket impl turns every
//! `DocumentSpec` into a `Document` trait object so containers can hold a mix
//! of kinds.

use crate::error::ValidationError;
use crate::types::v1alpha1;
use crate::types::{kinds, network};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Runtime context a document is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationMode {
    in_container: bool,
    requires_install: bool,
    strict: bool,
    allow_unknown: bool,
}

impl ValidationMode {
    /// Config read back from the state partition: neither in-container nor
    /// install-requiring.
    pub fn disk() -> Self {
        Self::default()
    }

    /// Bare-metal boot: an install section is required.
    pub fn metal() -> Self {
        Self {
            requires_install: true,
            ..Self::default()
        }
    }

    /// Running inside a container: install sections are ignored.
    pub fn container() -> Self {
        Self {
            in_container: true,
            ..Self::default()
        }
    }

    /// Treat warnings as errors.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Accept documents of unregistered kinds with a warning.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    /// Whether unregistered kinds are accepted.
    pub fn allows_unknown(&self) -> bool {
        self.allow_unknown
    }

    /// Whether the node runs inside a container.
    pub fn in_container(&self) -> bool {
        self.in_container
    }

    /// Whether an install section is required.
    pub fn requires_install(&self) -> bool {
        self.requires_install
    }

    /// Whether warnings are promoted to errors.
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.in_container {
            "container"
        } else if self.requires_install {
            "metal"
        } else {
            "disk"
        };
        write!(f, "{}", name)
    }
}

/// Warnings and errors collected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ValidationReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Records an error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Records the error of a `Result`, if any.
    pub fn check<T>(&mut self, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Merges another report into this one.
    pub fn extend(&mut self, other: ValidationReport) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Prefixes every message with `context: `.
    pub fn with_context(self, context: &str) -> Self {
        Self {
            warnings: self
                .warnings
                .into_iter()
                .map(|w| format!("{}: {}", context, w))
                .collect(),
            errors: self
                .errors
                .into_iter()
                .map(|e| format!("{}: {}", context, e))
                .collect(),
        }
    }

    /// Recorded warnings.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Recorded errors.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// True when no errors were recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Warnings on success, a joined multi-error otherwise.
    pub fn into_result(self) -> Result<Vec<String>, ValidationError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

/// Read-only view of the node used by runtime validators.
pub trait RuntimeContext {
    /// Whether an IOMMU is present and enabled.
    fn iommu_enabled(&self) -> bool;
}

/// Equivalence classes of kinds that compete for the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictClass {
    /// Documents configuring a network link by its name
    Link,
    /// Documents announcing a virtual IP
    VirtualIp,
}

impl ConflictClass {
    /// All kinds belonging to the class.
    pub fn kinds(&self) -> &'static [&'static str] {
        match self {
            ConflictClass::Link => network::link::LINK_KINDS,
            ConflictClass::VirtualIp => &[kinds::LAYER2_VIP, kinds::HCLOUD_VIP],
        }
    }
}

/// A list field merged by key instead of being replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeKey {
    /// Top-level field holding the list
    pub field: &'static str,
    /// Key identifying list entries
    pub key: &'static str,
}

/// Value handed to a `DocumentVisitor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// String field
    Str(Option<&'a str>),
    /// Boolean field
    Bool(Option<bool>),
    /// Unsigned integer field
    UInt(Option<u64>),
    /// Duration field
    Duration(Option<Duration>),
    /// List field, with its length
    List(usize),
    /// Map field, with its length
    Map(usize),
}

/// Walks the semantic getters of a document.
pub trait DocumentVisitor {
    /// Called once per getter.
    fn visit(&mut self, field: &str, value: FieldValue<'_>);
}

/// Statically typed document kind.
pub trait DocumentSpec:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Registered kind name.
    const KIND: &'static str;

    /// One-line documentation rendered by the encoder in comment mode.
    const DESCRIPTION: &'static str;

    /// Scheme version of this instance.
    fn api_version(&self) -> &str;

    /// Stable name for kinds that may appear more than once.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Canonical example used by documentation and tests.
    fn example() -> Self;

    /// Pure validation.
    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        ValidationReport::new()
    }

    /// Validation against the running node.
    fn validate_runtime(&self, _ctx: &dyn RuntimeContext) -> ValidationReport {
        ValidationReport::new()
    }

    /// Class of kinds competing for this document's name.
    fn conflict_class(&self) -> Option<ConflictClass> {
        None
    }

    /// Checks against the legacy monolithic document.
    fn validate_legacy_conflicts(&self, _legacy: &v1alpha1::Config) -> Result<(), String> {
        Ok(())
    }

    /// Replaces secret fields in place.
    fn redact(&mut self, _replacement: &str) {}

    /// List fields merged by key.
    fn merge_keys() -> &'static [MergeKey] {
        &[]
    }

    /// Walks the semantic getters.
    fn accept(&self, visitor: &mut dyn DocumentVisitor);
}

/// Object-safe view of a document.
pub trait Document: fmt::Debug + Send + Sync {
    /// Kind name.
    fn kind(&self) -> &str;

    /// Scheme version.
    fn api_version(&self) -> &str;

    /// Stable name, if the kind is named.
    fn name(&self) -> Option<&str>;

    /// One-line documentation.
    fn description(&self) -> &'static str;

    /// YAML representation in canonical field order.
    fn to_value(&self) -> Result<serde_yaml::Value, serde_yaml::Error>;

    /// Deep copy.
    fn clone_box(&self) -> Box<dyn Document>;

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;

    /// Downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Structural equality with another document.
    fn doc_eq(&self, other: &dyn Document) -> bool;

    /// Pure validation.
    fn validate(&self, mode: &ValidationMode) -> ValidationReport;

    /// Validation against the running node.
    fn validate_runtime(&self, ctx: &dyn RuntimeContext) -> ValidationReport;

    /// Class of kinds competing for this document's name.
    fn conflict_class(&self) -> Option<ConflictClass>;

    /// Kinds this document cannot share a name with.
    fn conflicts_with_kinds(&self) -> Vec<&'static str> {
        let own = self.kind().to_string();
        self.conflict_class()
            .map(|class| {
                class
                    .kinds()
                    .iter()
                    .copied()
                    .filter(|kind| *kind != own)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks against the legacy monolithic document.
    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String>;

    /// Replaces secret fields in place.
    fn redact(&mut self, replacement: &str);

    /// List fields merged by key.
    fn merge_keys(&self) -> &'static [MergeKey];

    /// Walks the semantic getters.
    fn accept(&self, visitor: &mut dyn DocumentVisitor);

    /// True for placeholders of unregistered kinds.
    fn is_unknown(&self) -> bool {
        false
    }

    /// Canonical example of the kind, rendered by the encoder.
    fn example_value(&self) -> Option<serde_yaml::Value> {
        None
    }
}

impl<T: DocumentSpec> Document for T {
    fn kind(&self) -> &str {
        T::KIND
    }

    fn api_version(&self) -> &str {
        DocumentSpec::api_version(self)
    }

    fn name(&self) -> Option<&str> {
        DocumentSpec::name(self)
    }

    fn description(&self) -> &'static str {
        T::DESCRIPTION
    }

    fn to_value(&self) -> Result<serde_yaml::Value, serde_yaml::Error> {
        serde_yaml::to_value(self)
    }

    fn clone_box(&self) -> Box<dyn Document> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn doc_eq(&self, other: &dyn Document) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn validate(&self, mode: &ValidationMode) -> ValidationReport {
        DocumentSpec::validate(self, mode)
    }

    fn validate_runtime(&self, ctx: &dyn RuntimeContext) -> ValidationReport {
        DocumentSpec::validate_runtime(self, ctx)
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        DocumentSpec::conflict_class(self)
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        DocumentSpec::validate_legacy_conflicts(self, legacy)
    }

    fn redact(&mut self, replacement: &str) {
        DocumentSpec::redact(self, replacement)
    }

    fn merge_keys(&self) -> &'static [MergeKey] {
        T::merge_keys()
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        DocumentSpec::accept(self, visitor)
    }

    fn example_value(&self) -> Option<serde_yaml::Value> {
        serde_yaml::to_value(T::example()).ok()
    }
}

impl Clone for Box<dyn Document> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Visitor that records every visited field name, used in tests and by
/// documentation tooling.
#[derive(Debug, Default)]
pub struct FieldCollector {
    /// Visited `(field, rendered value)` pairs
    pub fields: Vec<(String, String)>,
}

impl DocumentVisitor for FieldCollector {
    fn visit(&mut self, field: &str, value: FieldValue<'_>) {
        let rendered = match value {
            FieldValue::Str(v) => v.unwrap_or_default().to_string(),
            FieldValue::Bool(v) => v.map(|b| b.to_string()).unwrap_or_default(),
            FieldValue::UInt(v) => v.map(|n| n.to_string()).unwrap_or_default(),
            FieldValue::Duration(v) => v
                .map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_default(),
            FieldValue::List(n) | FieldValue::Map(n) => n.to_string(),
        };
        self.fields.push((field.to_string(), rendered));
    }
}

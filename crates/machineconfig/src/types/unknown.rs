//! Placeholder for documents of unregistered kinds.

use crate::document::{
    ConflictClass, Document, DocumentVisitor, FieldValue, MergeKey, RuntimeContext, ValidationMode,
    ValidationReport,
};
use crate::types::v1alpha1;
use serde_yaml::Value;
use std::any::Any;

/// A document whose `(kind, apiVersion)` is not registered.
///
/// The raw YAML is kept so the document survives a load/encode cycle and
/// can be reported in diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    kind: String,
    api_version: String,
    name: Option<String>,
    raw: Value,
}

impl Unknown {
    /// Wraps a raw document.
    pub fn new(kind: impl Into<String>, api_version: impl Into<String>, raw: Value) -> Self {
        let name = raw.get("name").and_then(Value::as_str).map(str::to_string);
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            name,
            raw,
        }
    }

    /// The document as it was read.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl Document for Unknown {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn description(&self) -> &'static str {
        "Unrecognized document."
    }

    fn to_value(&self) -> Result<Value, serde_yaml::Error> {
        Ok(self.raw.clone())
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
            .downcast_ref::<Unknown>()
            .is_some_and(|other| self == other)
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.error(format!(
            "unknown document kind {:?} (apiVersion {:?})",
            self.kind, self.api_version
        ));
        report
    }

    fn validate_runtime(&self, _ctx: &dyn RuntimeContext) -> ValidationReport {
        ValidationReport::new()
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        None
    }

    fn validate_legacy_conflicts(&self, _legacy: &v1alpha1::Config) -> Result<(), String> {
        Ok(())
    }

    fn redact(&mut self, _replacement: &str) {}

    fn merge_keys(&self) -> &'static [MergeKey] {
        &[]
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("kind", FieldValue::Str(Some(&self.kind)));
        visitor.visit("apiVersion", FieldValue::Str(Some(&self.api_version)));
        visitor.visit("name", FieldValue::Str(self.name.as_deref()));
    }

    fn is_unknown(&self) -> bool {
        true
    }
}

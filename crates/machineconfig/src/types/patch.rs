//! `$patch: delete` tombstones.
//!
//! A tombstone names a document by `(kind, name)`; merging a container that
//! holds one removes the matching document from the result. Tombstones are
//! only decoded when the loader allows them.

use crate::document::{
    ConflictClass, Document, DocumentVisitor, FieldValue, MergeKey, RuntimeContext, ValidationMode,
    ValidationReport,
};
use crate::types::v1alpha1;
use serde_yaml::{Mapping, Value};
use std::any::Any;

/// Key marking a tombstone.
pub const PATCH_KEY: &str = "$patch";

/// Value of [`PATCH_KEY`] marking a tombstone.
pub const PATCH_DELETE: &str = "delete";

/// Deletes the document with the same kind and name on merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePatch {
    kind: String,
    api_version: String,
    name: Option<String>,
}

impl DeletePatch {
    /// Tombstone for `(kind, name)`.
    pub fn new(kind: impl Into<String>, api_version: impl Into<String>, name: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            api_version: api_version.into(),
            name,
        }
    }

    /// Whether `value` is a tombstone mapping.
    pub fn is_tombstone(value: &Value) -> bool {
        value
            .get(PATCH_KEY)
            .and_then(Value::as_str)
            .is_some_and(|v| v == PATCH_DELETE)
    }

    /// Whether `doc` is the document this tombstone deletes.
    pub fn matches(&self, doc: &dyn Document) -> bool {
        doc.kind() == self.kind && doc.name() == self.name.as_deref()
    }
}

impl Document for DeletePatch {
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
        "Deletes the matching document when merged."
    }

    fn to_value(&self) -> Result<Value, serde_yaml::Error> {
        let mut map = Mapping::new();
        if !self.api_version.is_empty() {
            map.insert("apiVersion".into(), self.api_version.clone().into());
        }
        if self.kind == crate::types::kinds::V1ALPHA1 {
            map.insert("version".into(), self.kind.clone().into());
        } else {
            map.insert("kind".into(), self.kind.clone().into());
        }
        if let Some(name) = &self.name {
            map.insert("name".into(), name.clone().into());
        }
        map.insert(PATCH_KEY.into(), PATCH_DELETE.into());
        Ok(Value::Mapping(map))
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
            .downcast_ref::<DeletePatch>()
            .is_some_and(|other| self == other)
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.error(format!(
            "patch delete document for kind {:?} must be merged before validation",
            self.kind
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
        visitor.visit("name", FieldValue::Str(self.name.as_deref()));
    }
}

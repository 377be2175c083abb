//! Container merging.
//!
//! Documents of the patch are matched to the base by `(kind, name)`. A match
//! is deep-merged: mappings merge recursively, list fields with a declared
//! merge key replace entries by key and append the rest, every other value
//! is overridden. Zero values in the patch never override. Unmatched
//! documents are appended, tombstones delete.

use crate::container::Container;
use crate::document::{Document, MergeKey};
use crate::error::ContainerError;
use crate::registry::Registry;
use crate::types::patch::DeletePatch;
use serde_yaml::Value;
use tracing::debug;

impl Container {
    /// Merges `patch` on top of this container.
    pub fn merge(&self, patch: &Container) -> Result<Container, ContainerError> {
        merge(self, patch)
    }
}

/// Merges `patch` on top of `base`, returning a new mutable container.
pub fn merge(base: &Container, patch: &Container) -> Result<Container, ContainerError> {
    let mut documents: Vec<Box<dyn Document>> = base.documents().to_vec();

    for doc in patch.documents() {
        if let Some(tombstone) = doc.as_any().downcast_ref::<DeletePatch>() {
            let before = documents.len();
            documents.retain(|d| !tombstone.matches(d.as_ref()));
            debug!(
                "Patch deleted {} document(s) of kind {}",
                before - documents.len(),
                tombstone.kind()
            );
            continue;
        }

        let existing = documents
            .iter()
            .position(|d| d.kind() == doc.kind() && d.name() == doc.name());
        match existing {
            Some(i) => documents[i] = merge_document(documents[i].as_ref(), doc.as_ref())?,
            None => documents.push(doc.clone()),
        }
    }

    Container::new(documents)
}

fn merge_document(base: &dyn Document, patch: &dyn Document) -> Result<Box<dyn Document>, ContainerError> {
    let to_value = |doc: &dyn Document| {
        doc.to_value()
            .map_err(|e| ContainerError::Merge(format!("{}: {}", doc.kind(), e)))
    };
    let mut merged = to_value(base)?;
    merge_values(&mut merged, to_value(patch)?, base.merge_keys(), true);
    Registry::global()
        .decode(merged, false)
        .map_err(|e| ContainerError::Merge(format!("{}: {}", base.kind(), e)))
}

/// Zero values of a patch: null, false, zero and empty collections.
fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        Value::Mapping(m) => m.is_empty(),
        Value::Tagged(_) => false,
    }
}

/// Merges `patch` into `base`.
///
/// `keys` only apply to fields of the top-level mapping.
pub fn merge_values(base: &mut Value, patch: Value, keys: &[MergeKey], top_level: bool) {
    match (base, patch) {
        (Value::Mapping(base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                if is_zero(&value) {
                    continue;
                }
                let merge_key = top_level
                    .then(|| key.as_str())
                    .flatten()
                    .and_then(|field| keys.iter().find(|k| k.field == field));
                match (base.get_mut(&key), merge_key) {
                    (Some(Value::Sequence(existing)), Some(merge_key)) => {
                        if let Value::Sequence(items) = value {
                            merge_by_key(existing, items, merge_key.key);
                        } else {
                            base.insert(key, value);
                        }
                    }
                    (Some(existing @ Value::Mapping(_)), _) if value.is_mapping() => {
                        merge_values(existing, value, keys, false);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn merge_by_key(existing: &mut Vec<Value>, items: Vec<Value>, key: &str) {
    for item in items {
        let id = item.get(key).cloned();
        let slot = id
            .as_ref()
            .and_then(|id| existing.iter_mut().find(|e| e.get(key) == Some(id)));
        match slot {
            Some(slot) => *slot = item,
            None => existing.push(item),
        }
    }
}

//! Ordered set of documents forming one machine configuration.
//!
//! A container owns its documents. Containers built by the loader are
//! readonly: they keep the bytes they were decoded from so [`Container::bytes`]
//! reproduces the input exactly. Any mutation of a readonly container drops
//! those bytes and turns it into a regular mutable copy first.

use crate::document::{Document, DocumentSpec, RuntimeContext, ValidationMode, ValidationReport};
use crate::encoder::{self, EncoderOptions};
use crate::error::{ContainerError, ValidationError};
use crate::types::siderolink::SideroLinkConfig;
use crate::types::{kinds, v1alpha1};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Ordered list of documents.
#[derive(Clone, Default)]
pub struct Container {
    documents: Vec<Box<dyn Document>>,
    bytes: Option<Vec<u8>>,
    readonly: bool,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("documents", &self.documents)
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.documents.len() == other.documents.len()
            && self
                .documents
                .iter()
                .zip(&other.documents)
                .all(|(a, b)| a.doc_eq(b.as_ref()))
    }
}

fn key_of(doc: &dyn Document) -> (String, String) {
    (
        doc.kind().to_string(),
        doc.name().unwrap_or_default().to_string(),
    )
}

fn check_unique(documents: &[Box<dyn Document>]) -> Result<(), ContainerError> {
    let mut seen = BTreeSet::new();
    for doc in documents {
        let (kind, name) = key_of(doc.as_ref());
        if !seen.insert((kind.clone(), name.clone())) {
            if kind == kinds::V1ALPHA1 {
                return Err(ContainerError::DuplicateLegacy);
            }
            return Err(ContainerError::Duplicate { kind, name });
        }
    }
    Ok(())
}

impl Container {
    /// Mutable container; fails if two documents share `(kind, name)`.
    pub fn new(documents: Vec<Box<dyn Document>>) -> Result<Self, ContainerError> {
        check_unique(&documents)?;
        Ok(Self {
            documents,
            bytes: None,
            readonly: false,
        })
    }

    /// Readonly container remembering the bytes it was decoded from.
    pub fn new_readonly(
        documents: Vec<Box<dyn Document>>,
        bytes: Vec<u8>,
    ) -> Result<Self, ContainerError> {
        check_unique(&documents)?;
        Ok(Self {
            documents,
            bytes: Some(bytes),
            readonly: true,
        })
    }

    /// Container holding only a legacy monolithic document.
    pub fn from_legacy(config: v1alpha1::Config) -> Self {
        Self {
            documents: vec![Box::new(config)],
            bytes: None,
            readonly: false,
        }
    }

    /// Whether the container is a readonly snapshot.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Readonly copy of this container.
    ///
    /// The copy keeps the original bytes when this container has them.
    pub fn readonly_snapshot(&self) -> Container {
        Container {
            documents: self.documents.clone(),
            bytes: self.bytes.clone(),
            readonly: true,
        }
    }

    fn detach(&mut self) {
        if self.readonly {
            debug!("Cloning readonly container for mutation");
            self.readonly = false;
        }
        self.bytes = None;
    }

    /// Appends a document.
    pub fn append(&mut self, doc: Box<dyn Document>) -> Result<(), ContainerError> {
        let key = key_of(doc.as_ref());
        if self.documents.iter().any(|d| key_of(d.as_ref()) == key) {
            if key.0 == kinds::V1ALPHA1 {
                return Err(ContainerError::DuplicateLegacy);
            }
            return Err(ContainerError::Duplicate {
                kind: key.0,
                name: key.1,
            });
        }
        self.detach();
        self.documents.push(doc);
        Ok(())
    }

    /// Removes and returns every document matching `predicate`.
    pub fn remove_where(
        &mut self,
        mut predicate: impl FnMut(&dyn Document) -> bool,
    ) -> Vec<Box<dyn Document>> {
        if !self.documents.iter().any(|d| predicate(d.as_ref())) {
            return Vec::new();
        }
        self.detach();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.documents)
            .into_iter()
            .partition(|d| predicate(d.as_ref()));
        self.documents = kept;
        removed
    }

    /// Documents in order.
    pub fn documents(&self) -> &[Box<dyn Document>] {
        &self.documents
    }

    /// Consumes the container, returning its documents.
    pub fn into_documents(self) -> Vec<Box<dyn Document>> {
        self.documents
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when the container holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document with `kind` and `name`; pass `None` for unnamed kinds.
    pub fn lookup(&self, kind: &str, name: Option<&str>) -> Option<&dyn Document> {
        let name = name.unwrap_or_default();
        self.documents
            .iter()
            .map(|d| d.as_ref())
            .find(|d| d.kind() == kind && d.name().unwrap_or_default() == name)
    }

    /// First document of type `T`.
    pub fn get<T: DocumentSpec>(&self) -> Option<&T> {
        self.all::<T>().next()
    }

    /// Every document of type `T`, in order.
    pub fn all<T: DocumentSpec>(&self) -> impl Iterator<Item = &T> {
        self.documents
            .iter()
            .filter_map(|d| d.as_any().downcast_ref::<T>())
    }

    /// Document of type `T` named `name`.
    pub fn named<T: DocumentSpec>(&self, name: &str) -> Option<&T> {
        self.documents
            .iter()
            .filter(|d| d.name() == Some(name))
            .find_map(|d| d.as_any().downcast_ref::<T>())
    }

    /// The legacy monolithic document.
    pub fn legacy(&self) -> Option<&v1alpha1::Config> {
        self.get::<v1alpha1::Config>()
    }

    /// SideroLink endpoint document.
    pub fn siderolink(&self) -> Option<&SideroLinkConfig> {
        self.get::<SideroLinkConfig>()
    }

    /// Machine type of the legacy document.
    pub fn machine_type(&self) -> v1alpha1::MachineType {
        self.legacy()
            .map(v1alpha1::Config::machine_type)
            .unwrap_or_default()
    }

    /// Cluster name of the legacy document.
    pub fn cluster_name(&self) -> Option<&str> {
        self.legacy().and_then(v1alpha1::Config::cluster_name)
    }

    /// Whether the container carries enough to boot the node.
    ///
    /// Only the legacy document holds machine and cluster sections, so a
    /// container of fragments is never complete.
    pub fn is_complete_for_boot(&self) -> bool {
        self.legacy()
            .is_some_and(v1alpha1::Config::is_complete_for_boot)
    }

    /// Validates every container invariant and every document.
    ///
    /// Returns the collected warnings. In strict mode warnings are errors.
    pub fn validate(&self, mode: &ValidationMode) -> Result<Vec<String>, ValidationError> {
        let mut report = ValidationReport::new();

        if let Err(e) = check_unique(&self.documents) {
            report.error(e.to_string());
        }

        for (i, doc) in self.documents.iter().enumerate() {
            let conflicting = doc.conflicts_with_kinds();
            if conflicting.is_empty() {
                continue;
            }
            for other in &self.documents[i + 1..] {
                if conflicting.contains(&other.kind()) && other.name() == doc.name() {
                    report.error(format!(
                        "{} {:?} conflicts with {} {:?}",
                        doc.kind(),
                        doc.name().unwrap_or_default(),
                        other.kind(),
                        other.name().unwrap_or_default()
                    ));
                }
            }
        }

        if let Some(legacy) = self.legacy() {
            for doc in &self.documents {
                if let Err(e) = doc.validate_legacy_conflicts(legacy) {
                    report.error(format!("{}: {}", context(doc.as_ref()), e));
                }
            }
        }

        for doc in &self.documents {
            if doc.is_unknown() && mode.allows_unknown() {
                report.warn(format!("ignoring unknown document {}", context(doc.as_ref())));
                continue;
            }
            report.extend(doc.validate(mode).with_context(&context(doc.as_ref())));
        }

        strictify(report, mode).into_result()
    }

    /// Validates every document against the running node.
    pub fn validate_runtime(&self, ctx: &dyn RuntimeContext) -> Result<Vec<String>, ValidationError> {
        let mut report = ValidationReport::new();
        for doc in &self.documents {
            report.extend(doc.validate_runtime(ctx).with_context(&context(doc.as_ref())));
        }
        report.into_result()
    }

    /// Copy with every secret replaced by `replacement`.
    pub fn redact_secrets(&self, replacement: &str) -> Container {
        let mut documents = self.documents.clone();
        for doc in &mut documents {
            doc.redact(replacement);
        }
        Container {
            documents,
            bytes: None,
            readonly: false,
        }
    }

    /// Canonical YAML.
    ///
    /// A readonly container returns the bytes it was decoded from.
    pub fn bytes(&self) -> Result<Vec<u8>, serde_yaml::Error> {
        match &self.bytes {
            Some(bytes) => Ok(bytes.clone()),
            None => self.encode(&EncoderOptions::canonical()),
        }
    }

    /// Re-encodes the documents, ignoring remembered bytes.
    pub fn encode(&self, options: &EncoderOptions) -> Result<Vec<u8>, serde_yaml::Error> {
        encoder::encode(&self.documents, options)
    }
}

fn context(doc: &dyn Document) -> String {
    match doc.name() {
        Some(name) if !name.is_empty() => format!("{} {:?}", doc.kind(), name),
        _ => doc.kind().to_string(),
    }
}

fn strictify(report: ValidationReport, mode: &ValidationMode) -> ValidationReport {
    if !mode.is_strict() || report.warnings().is_empty() {
        return report;
    }
    let mut strict = ValidationReport::new();
    for e in report.errors() {
        strict.error(e.clone());
    }
    for w in report.warnings() {
        strict.error(w.clone());
    }
    strict
}

#[cfg(test)]
#[path = "container_test.rs"]
mod container_test;

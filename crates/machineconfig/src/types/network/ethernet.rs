//! Ethernet driver settings.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ring buffer sizes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EthernetRings {
    /// RX ring size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx: Option<u32>,

    /// TX ring size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<u32>,
}

/// Ethernet features, rings and channels of a physical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Offload features to toggle, keyed by feature name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,

    /// Ring buffer sizes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rings: Option<EthernetRings>,
}

impl DocumentSpec for EthernetConfig {
    const KIND: &'static str = kinds::ETHERNET;
    const DESCRIPTION: &'static str = "Ethernet driver settings of a physical link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        EthernetConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "enp0s2".to_string(),
            features: BTreeMap::from([("tx-tcp-segmentation".to_string(), false)]),
            rings: Some(EthernetRings {
                rx: Some(256),
                tx: None,
            }),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if let Some(rings) = &self.rings {
            if rings.rx == Some(0) || rings.tx == Some(0) {
                report.error("ring sizes must be positive");
            }
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("features", FieldValue::Map(self.features.len()));
        visitor.visit(
            "rxRing",
            FieldValue::UInt(self.rings.as_ref().and_then(|r| r.rx).map(u64::from)),
        );
        visitor.visit(
            "txRing",
            FieldValue::UInt(self.rings.as_ref().and_then(|r| r.tx).map(u64::from)),
        );
    }
}

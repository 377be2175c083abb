//! VLAN and VRF links.

use super::link::{CommonLinkConfig, legacy_link_conflict};
use crate::document::{
    ConflictClass, DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport,
};
use crate::types::v1alpha1;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// Configuration of a VLAN link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VlanConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// VLAN ID
    #[serde(default, rename = "vlanID")]
    pub vlan_id: u16,

    /// Parent link
    #[serde(default)]
    pub parent: String,

    /// `802.1q` or `802.1ad`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_mode: Option<String>,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl DocumentSpec for VlanConfig {
    const KIND: &'static str = kinds::VLAN;
    const DESCRIPTION: &'static str = "Configuration of a VLAN network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        VlanConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "enp0s2.34".to_string(),
            vlan_id: 34,
            parent: "enp0s2".to_string(),
            vlan_mode: None,
            link: CommonLinkConfig {
                up: Some(true),
                ..CommonLinkConfig::default()
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));

        if !(1..=4094).contains(&self.vlan_id) {
            report.error(format!("vlanID {} must be in range 1..=4094", self.vlan_id));
        }
        if self.parent.is_empty() {
            report.error("parent must be specified");
        }
        if let Some(mode) = self.vlan_mode.as_deref() {
            if mode != "802.1q" && mode != "802.1ad" {
                report.error(format!("vlanMode {:?} is not supported", mode));
            }
        }

        self.link.validate(&mut report);
        report
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        Some(ConflictClass::Link)
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        legacy_link_conflict(&self.name, legacy)
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("vlanID", FieldValue::UInt(Some(u64::from(self.vlan_id))));
        visitor.visit("parent", FieldValue::Str(Some(&self.parent)));
        visitor.visit("vlanMode", FieldValue::Str(self.vlan_mode.as_deref()));
        self.link.accept(visitor);
    }
}

const RESERVED_TABLES: &[&str] = &["unspec", "local", "main", "default"];

/// Configuration of a VRF link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VrfConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Enslaved links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Routing table, by name or number
    #[serde(default)]
    pub table: String,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl VrfConfig {
    /// Numeric table ID, when given as a number.
    pub fn table_id(&self) -> Option<u32> {
        self.table.parse().ok()
    }
}

impl DocumentSpec for VrfConfig {
    const KIND: &'static str = kinds::VRF;
    const DESCRIPTION: &'static str = "Configuration of a VRF network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        VrfConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "vrf-blue".to_string(),
            links: vec!["enp0s5".to_string()],
            table: "123".to_string(),
            link: CommonLinkConfig::default(),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));

        let reserved_id = matches!(self.table_id(), Some(0 | 253..=255));
        if self.table.is_empty() {
            report.error("table must be specified");
        } else if RESERVED_TABLES.contains(&self.table.as_str()) || reserved_id {
            report.error(format!("table {:?} is reserved", self.table));
        }

        self.link.validate(&mut report);
        report
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        Some(ConflictClass::Link)
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        legacy_link_conflict(&self.name, legacy)
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("links", FieldValue::List(self.links.len()));
        visitor.visit("table", FieldValue::Str(Some(&self.table)));
        self.link.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlan_id_range() {
        let mut vlan = VlanConfig::example();
        assert!(DocumentSpec::validate(&vlan, &ValidationMode::disk()).is_ok());

        for id in [0, 4095] {
            vlan.vlan_id = id;
            assert!(!DocumentSpec::validate(&vlan, &ValidationMode::disk()).is_ok(), "{}", id);
        }
        vlan.vlan_id = 4094;
        assert!(DocumentSpec::validate(&vlan, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_vrf_reserved_tables() {
        let mut vrf = VrfConfig::example();
        assert!(DocumentSpec::validate(&vrf, &ValidationMode::disk()).is_ok());

        for table in ["unspec", "local", "main", "default", "254", ""] {
            vrf.table = table.to_string();
            assert!(!DocumentSpec::validate(&vrf, &ValidationMode::disk()).is_ok(), "{}", table);
        }
    }
}

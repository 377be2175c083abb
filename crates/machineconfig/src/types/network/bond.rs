//! Bond and bridge links.

use super::link::{CommonLinkConfig, legacy_link_conflict};
use crate::document::{
    ConflictClass, DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport,
};
use crate::types::v1alpha1;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

const BOND_MODES: &[&str] = &[
    "balance-rr",
    "active-backup",
    "balance-xor",
    "broadcast",
    "802.3ad",
    "balance-tlb",
    "balance-alb",
];

/// Configuration of a bond link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Member links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Bonding mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<String>,

    /// MII link monitoring interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miimon: Option<u32>,

    /// LACP rate (`slow` or `fast`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lacp_rate: Option<String>,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl DocumentSpec for BondConfig {
    const KIND: &'static str = kinds::BOND;
    const DESCRIPTION: &'static str = "Configuration of a bond network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        BondConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "bond0".to_string(),
            links: vec!["enp0s2".to_string(), "enp0s3".to_string()],
            bond_mode: Some("802.3ad".to_string()),
            miimon: Some(100),
            lacp_rate: Some("fast".to_string()),
            link: CommonLinkConfig {
                up: Some(true),
                ..CommonLinkConfig::default()
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));

        match self.bond_mode.as_deref() {
            None | Some("") => report.error("bondMode must be specified"),
            Some(mode) if !BOND_MODES.contains(&mode) => {
                report.error(format!("bondMode {:?} is not supported", mode))
            }
            Some(_) => {}
        }

        if self.links.is_empty() {
            report.error("at least one link must be specified");
        }

        if let Some(rate) = self.lacp_rate.as_deref() {
            if rate != "slow" && rate != "fast" {
                report.error(format!("lacpRate {:?} must be slow or fast", rate));
            }
            if self.bond_mode.as_deref() != Some("802.3ad") {
                report.warn("lacpRate is only used in 802.3ad mode");
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
        visitor.visit("links", FieldValue::List(self.links.len()));
        visitor.visit("bondMode", FieldValue::Str(self.bond_mode.as_deref()));
        visitor.visit("miimon", FieldValue::UInt(self.miimon.map(u64::from)));
        visitor.visit("lacpRate", FieldValue::Str(self.lacp_rate.as_deref()));
        self.link.accept(visitor);
    }
}

/// Spanning tree settings of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StpConfig {
    /// Enable STP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Configuration of a bridge link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Member links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Spanning tree settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stp: Option<StpConfig>,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl DocumentSpec for BridgeConfig {
    const KIND: &'static str = kinds::BRIDGE;
    const DESCRIPTION: &'static str = "Configuration of a bridge network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        BridgeConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "br0".to_string(),
            links: vec!["enp0s4".to_string()],
            stp: Some(StpConfig { enabled: Some(true) }),
            link: CommonLinkConfig {
                up: Some(true),
                ..CommonLinkConfig::default()
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if self.links.iter().any(|l| l == &self.name) {
            report.error(format!("bridge {:?} cannot contain itself", self.name));
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
        visitor.visit(
            "stpEnabled",
            FieldValue::Bool(self.stp.as_ref().and_then(|s| s.enabled)),
        );
        self.link.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bond_mode_required() {
        let mut bond = BondConfig::example();
        assert!(DocumentSpec::validate(&bond, &ValidationMode::disk()).is_ok());

        bond.bond_mode = None;
        let report = DocumentSpec::validate(&bond, &ValidationMode::disk());
        assert!(report.errors().iter().any(|e| e.contains("bondMode must be specified")));

        bond.bond_mode = Some("round-robin".to_string());
        assert!(!DocumentSpec::validate(&bond, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_lacp_rate_warning() {
        let mut bond = BondConfig::example();
        bond.bond_mode = Some("active-backup".to_string());
        let report = DocumentSpec::validate(&bond, &ValidationMode::disk());
        assert!(report.is_ok());
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_bridge_self_member() {
        let mut bridge = BridgeConfig::example();
        bridge.links.push("br0".to_string());
        assert!(!DocumentSpec::validate(&bridge, &ValidationMode::disk()).is_ok());
    }
}

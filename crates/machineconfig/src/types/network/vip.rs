//! Virtual IP announcement.
//!
//! A virtual IP is announced either over layer 2 (gratuitous ARP / NDP) or
//! through the Hetzner Cloud API; one address can only be claimed by one of
//! the two kinds.

use crate::document::{
    ConflictClass, DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport,
};
use crate::types::{api_version, kinds};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

fn validate_vip(name: &str, link: &str) -> ValidationReport {
    let mut report = ValidationReport::new();
    match name.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => report.error(format!("name {:?} is unspecified", name)),
        Ok(_) => {}
        Err(_) => report.error(format!("name {:?} must be an IP address", name)),
    }
    if link.is_empty() {
        report.error("link must be specified");
    }
    report
}

/// Virtual IP announced over layer 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer2VipConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Virtual IP
    #[serde(default)]
    pub name: String,

    /// Link the address is announced on
    #[serde(default)]
    pub link: String,
}

impl DocumentSpec for Layer2VipConfig {
    const KIND: &'static str = kinds::LAYER2_VIP;
    const DESCRIPTION: &'static str = "Virtual IP shared between nodes and announced over layer 2.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        Layer2VipConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "10.3.0.1".to_string(),
            link: "enp0s2".to_string(),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        validate_vip(&self.name, &self.link)
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        Some(ConflictClass::VirtualIp)
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("link", FieldValue::Str(Some(&self.link)));
    }
}

/// Virtual IP managed through the Hetzner Cloud API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HcloudVipConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Virtual IP
    #[serde(default)]
    pub name: String,

    /// Link the address is assigned to
    #[serde(default)]
    pub link: String,

    /// API token (secret)
    #[serde(default)]
    pub api_token: String,
}

impl DocumentSpec for HcloudVipConfig {
    const KIND: &'static str = kinds::HCLOUD_VIP;
    const DESCRIPTION: &'static str = "Virtual IP assigned through the Hetzner Cloud API.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        HcloudVipConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "10.3.0.2".to_string(),
            link: "enp0s2".to_string(),
            api_token: "my-api-token".to_string(),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = validate_vip(&self.name, &self.link);
        if self.api_token.is_empty() {
            report.error("apiToken must be specified");
        }
        report
    }

    fn conflict_class(&self) -> Option<ConflictClass> {
        Some(ConflictClass::VirtualIp)
    }

    fn redact(&mut self, replacement: &str) {
        if !self.api_token.is_empty() {
            self.api_token = replacement.to_string();
        }
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("link", FieldValue::Str(Some(&self.link)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn test_vip_validation() {
        let mut vip = Layer2VipConfig::example();
        assert!(DocumentSpec::validate(&vip, &ValidationMode::disk()).is_ok());
        vip.name = "0.0.0.0".to_string();
        vip.link = String::new();
        assert_eq!(DocumentSpec::validate(&vip, &ValidationMode::disk()).errors().len(), 2);
    }

    #[test]
    fn test_conflicts_with_kinds() {
        assert_eq!(Layer2VipConfig::example().conflicts_with_kinds(), vec![kinds::HCLOUD_VIP]);
        assert_eq!(HcloudVipConfig::example().conflicts_with_kinds(), vec![kinds::LAYER2_VIP]);
    }

    #[test]
    fn test_redact_token() {
        let mut vip = HcloudVipConfig::example();
        DocumentSpec::redact(&mut vip, "***");
        assert_eq!(vip.api_token, "***");
        assert_eq!(vip.name, "10.3.0.2");
    }
}

//! Physical and dummy links, and the settings shared by every link kind.

use crate::document::{
    ConflictClass, DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport,
};
use crate::net::{Prefix, validate_address};
use crate::types::v1alpha1;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Kinds that claim a link by its name.
pub const LINK_KINDS: &[&str] = &[
    kinds::LINK,
    kinds::BOND,
    kinds::BRIDGE,
    kinds::DUMMY_LINK,
    kinds::VLAN,
    kinds::VRF,
    kinds::WIREGUARD,
];

/// Address assigned to a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressConfig {
    /// Address in CIDR notation
    pub address: String,

    /// Metric of the prefix route created for the address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_priority: Option<u32>,
}

/// Static route installed through a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Destination prefix, default route when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Next hop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Preferred source address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Route metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,

    /// Route MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Routing table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

/// Settings every link kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonLinkConfig {
    /// Bring the link up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<bool>,

    /// Link MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Static addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<AddressConfig>,

    /// Static routes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,
}

impl CommonLinkConfig {
    /// Validates addresses and routes.
    pub fn validate(&self, report: &mut ValidationReport) {
        for address in &self.addresses {
            report.check(validate_address(&address.address));
        }

        for (i, route) in self.routes.iter().enumerate() {
            if let Some(destination) = &route.destination {
                match destination.parse::<Prefix>() {
                    Ok(prefix) if prefix.addr().is_unspecified() && prefix.len() != 0 => {
                        report.error(format!("routes[{}]: destination {:?} is unspecified", i, destination));
                    }
                    Ok(_) => {}
                    Err(e) => report.error(format!("routes[{}]: destination {:?} is invalid: {}", i, destination, e)),
                }
            }
            if let Some(gateway) = &route.gateway {
                match gateway.parse::<IpAddr>() {
                    Ok(ip) if ip.is_unspecified() => {
                        report.error(format!("routes[{}]: gateway {:?} is unspecified", i, gateway));
                    }
                    Ok(_) => {}
                    Err(_) => report.error(format!("routes[{}]: gateway {:?} is not an IP address", i, gateway)),
                }
            }
            if let Some(source) = &route.source {
                if source.parse::<IpAddr>().is_err() {
                    report.error(format!("routes[{}]: source {:?} is not an IP address", i, source));
                }
            }
        }
    }

    /// Parsed addresses; invalid entries are skipped.
    pub fn prefixes(&self) -> Vec<Prefix> {
        self.addresses
            .iter()
            .filter_map(|a| a.address.parse().ok())
            .collect()
    }

    pub(crate) fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("up", FieldValue::Bool(self.up));
        visitor.visit("mtu", FieldValue::UInt(self.mtu.map(u64::from)));
        visitor.visit("addresses", FieldValue::List(self.addresses.len()));
        visitor.visit("routes", FieldValue::List(self.routes.len()));
    }
}

/// Rejects a link name already configured by the legacy document.
pub(crate) fn legacy_link_conflict(name: &str, legacy: &v1alpha1::Config) -> Result<(), String> {
    let configured = legacy
        .machine
        .as_ref()
        .and_then(|m| m.network.as_ref())
        .is_some_and(|n| n.interfaces.iter().any(|d| d.interface == name));
    if configured {
        Err(format!("link {:?} is already configured in v1alpha1 machine.network.interfaces", name))
    } else {
        Ok(())
    }
}

/// Configuration of a physical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl DocumentSpec for LinkConfig {
    const KIND: &'static str = kinds::LINK;
    const DESCRIPTION: &'static str = "Configuration of a physical network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        LinkConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "enp0s2".to_string(),
            link: CommonLinkConfig {
                up: Some(true),
                mtu: Some(9000),
                addresses: vec![AddressConfig {
                    address: "192.168.1.100/24".to_string(),
                    route_priority: None,
                }],
                routes: vec![RouteConfig {
                    gateway: Some("192.168.1.1".to_string()),
                    ..RouteConfig::default()
                }],
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
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
        self.link.accept(visitor);
    }
}

/// Configuration of a dummy link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DummyLinkConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Hardware address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_addr: Option<String>,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

fn valid_hardware_addr(addr: &str) -> bool {
    let octets: Vec<&str> = addr.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && u8::from_str_radix(o, 16).is_ok())
}

impl DocumentSpec for DummyLinkConfig {
    const KIND: &'static str = kinds::DUMMY_LINK;
    const DESCRIPTION: &'static str = "Configuration of a dummy network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        DummyLinkConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "dummy1".to_string(),
            hardware_addr: Some("2e:3c:4d:5e:6f:70".to_string()),
            link: CommonLinkConfig {
                up: Some(true),
                addresses: vec![AddressConfig {
                    address: "10.5.0.1/32".to_string(),
                    route_priority: None,
                }],
                ..CommonLinkConfig::default()
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if let Some(addr) = &self.hardware_addr {
            if !valid_hardware_addr(addr) {
                report.error(format!("hardwareAddr {:?} is invalid", addr));
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
        visitor.visit("hardwareAddr", FieldValue::Str(self.hardware_addr.as_deref()));
        self.link.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_validation() {
        let mut link = LinkConfig::example();
        assert!(DocumentSpec::validate(&link, &ValidationMode::disk()).is_ok());

        link.name = String::new();
        link.link.addresses.push(AddressConfig {
            address: "0.0.0.0/8".to_string(),
            route_priority: None,
        });
        link.link.routes.push(RouteConfig {
            destination: Some("10.0.0.0/8".to_string()),
            gateway: Some("::".to_string()),
            ..RouteConfig::default()
        });
        let report = DocumentSpec::validate(&link, &ValidationMode::disk());
        assert_eq!(report.errors().len(), 3, "{:?}", report.errors());
    }

    #[test]
    fn test_legacy_conflict() {
        let mut legacy = v1alpha1::Config::example();
        legacy.machine.as_mut().unwrap().network = Some(v1alpha1::NetworkConfig {
            interfaces: vec![v1alpha1::DeviceConfig {
                interface: "enp0s2".to_string(),
                ..v1alpha1::DeviceConfig::default()
            }],
            ..v1alpha1::NetworkConfig::default()
        });
        assert!(DocumentSpec::validate_legacy_conflicts(&LinkConfig::example(), &legacy).is_err());
        assert!(DocumentSpec::validate_legacy_conflicts(&DummyLinkConfig::example(), &legacy).is_ok());
    }

    #[test]
    fn test_hardware_addr() {
        let mut dummy = DummyLinkConfig::example();
        dummy.hardware_addr = Some("zz:00".to_string());
        assert!(!DocumentSpec::validate(&dummy, &ValidationMode::disk()).is_ok());
    }
}

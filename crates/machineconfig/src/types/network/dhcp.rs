//! DHCP client configuration.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// Client identifier sent by the DHCPv6 client.
const CLIENT_IDENTIFIER_DUID: &str = "duid";

fn validate_client_identifier(
    report: &mut ValidationReport,
    client_identifier: Option<&str>,
    duid_raw: Option<&str>,
) {
    match (client_identifier, duid_raw) {
        (Some(CLIENT_IDENTIFIER_DUID), None) => {
            report.error("duidRaw must be set when clientIdentifier is duid")
        }
        (Some(CLIENT_IDENTIFIER_DUID), Some(raw)) => {
            let valid = raw
                .split(':')
                .all(|octet| octet.len() == 2 && u8::from_str_radix(octet, 16).is_ok());
            if !valid {
                report.error(format!("duidRaw {:?} must be colon-separated hex octets", raw));
            }
        }
        (_, Some(_)) => report.error("duidRaw can only be set when clientIdentifier is duid"),
        (Some(other), None) if other != "mac" && other != "none" => {
            report.error(format!("clientIdentifier {:?} must be one of none, mac, duid", other))
        }
        _ => {}
    }
}

/// DHCPv4 client on a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dhcpv4Config {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Metric of routes learned over DHCP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_metric: Option<u32>,

    /// Hardware address, DUID, or nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identifier: Option<String>,

    /// DUID bytes, colon separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duid_raw: Option<String>,
}

impl DocumentSpec for Dhcpv4Config {
    const KIND: &'static str = kinds::DHCPV4;
    const DESCRIPTION: &'static str = "DHCPv4 client configuration for a link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        Dhcpv4Config {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "enp0s2".to_string(),
            route_metric: Some(1024),
            client_identifier: None,
            duid_raw: None,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        validate_client_identifier(
            &mut report,
            self.client_identifier.as_deref(),
            self.duid_raw.as_deref(),
        );
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("routeMetric", FieldValue::UInt(self.route_metric.map(u64::from)));
        visitor.visit("clientIdentifier", FieldValue::Str(self.client_identifier.as_deref()));
        visitor.visit("duidRaw", FieldValue::Str(self.duid_raw.as_deref()));
    }
}

/// DHCPv6 client on a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dhcpv6Config {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Metric of routes learned over DHCP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_metric: Option<u32>,

    /// Hardware address, DUID, or nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identifier: Option<String>,

    /// DUID bytes, colon separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duid_raw: Option<String>,
}

impl DocumentSpec for Dhcpv6Config {
    const KIND: &'static str = kinds::DHCPV6;
    const DESCRIPTION: &'static str = "DHCPv6 client configuration for a link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        Dhcpv6Config {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "enp0s2".to_string(),
            route_metric: None,
            client_identifier: Some("duid".to_string()),
            duid_raw: Some("00:01:00:01:23:45:67:89:0a:bc:de:f0:12:34".to_string()),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        validate_client_identifier(
            &mut report,
            self.client_identifier.as_deref(),
            self.duid_raw.as_deref(),
        );
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("routeMetric", FieldValue::UInt(self.route_metric.map(u64::from)));
        visitor.visit("clientIdentifier", FieldValue::Str(self.client_identifier.as_deref()));
        visitor.visit("duidRaw", FieldValue::Str(self.duid_raw.as_deref()));
    }
}

//! KubeSpan mesh settings.

use crate::constants::KUBESPAN_MIN_MTU;
use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::net::parse_ip_or_prefix;
use crate::types::v1alpha1;
use crate::types::{api_version, is_false, kinds};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Validates an address filter entry with an optional `!` negation.
pub fn validate_filter(entry: &str) -> Result<(), String> {
    let value = entry.strip_prefix('!').unwrap_or(entry);
    parse_ip_or_prefix(value)
        .map(|_| ())
        .map_err(|e| format!("filter {:?} is invalid: {}", entry, e))
}

/// Endpoint filters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KubeSpanFilters {
    /// Filters applied to advertised endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

/// KubeSpan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeSpanConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Enable KubeSpan
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Send all traffic through the mesh
    #[serde(default, skip_serializing_if = "is_false")]
    pub advertise_kubernetes_networks: bool,

    /// Allow peers reached only via their KubeSpan address
    #[serde(default, skip_serializing_if = "is_false")]
    pub harvest_extra_endpoints: bool,

    /// Mesh MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Endpoint filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<KubeSpanFilters>,
}

impl DocumentSpec for KubeSpanConfig {
    const KIND: &'static str = kinds::KUBESPAN;
    const DESCRIPTION: &'static str = "KubeSpan full-mesh WireGuard configuration.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        KubeSpanConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            enabled: true,
            advertise_kubernetes_networks: false,
            harvest_extra_endpoints: false,
            mtu: Some(1420),
            filters: Some(KubeSpanFilters {
                endpoints: vec!["0.0.0.0/0".to_string(), "!192.168.0.0/16".to_string()],
            }),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        if let Some(mtu) = self.mtu {
            if mtu < KUBESPAN_MIN_MTU {
                report.error(format!("mtu {} is less than the minimum {}", mtu, KUBESPAN_MIN_MTU));
            }
        }
        if let Some(filters) = &self.filters {
            for entry in &filters.endpoints {
                report.check(validate_filter(entry));
            }
        }
        report
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        let legacy_set = legacy
            .machine
            .as_ref()
            .and_then(|m| m.network.as_ref())
            .is_some_and(|n| n.kubespan.is_some());
        if legacy_set {
            return Err("kubespan is already configured in v1alpha1 machine.network.kubespan".to_string());
        }
        Ok(())
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("enabled", FieldValue::Bool(Some(self.enabled)));
        visitor.visit(
            "advertiseKubernetesNetworks",
            FieldValue::Bool(Some(self.advertise_kubernetes_networks)),
        );
        visitor.visit("harvestExtraEndpoints", FieldValue::Bool(Some(self.harvest_extra_endpoints)));
        visitor.visit("mtu", FieldValue::UInt(self.mtu.map(u64::from)));
        visitor.visit(
            "endpointFilters",
            FieldValue::List(self.filters.as_ref().map_or(0, |f| f.endpoints.len())),
        );
    }
}

/// Extra endpoints announced to KubeSpan peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubespanEndpointsConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// `ip:port` endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_announced_endpoints: Vec<String>,
}

impl DocumentSpec for KubespanEndpointsConfig {
    const KIND: &'static str = kinds::KUBESPAN_ENDPOINTS;
    const DESCRIPTION: &'static str = "Additional endpoints announced to KubeSpan peers.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        KubespanEndpointsConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            extra_announced_endpoints: vec!["192.168.13.46:52000".to_string()],
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        for endpoint in &self.extra_announced_endpoints {
            if endpoint.parse::<SocketAddr>().is_err() {
                report.error(format!("endpoint {:?} must be ip:port", endpoint));
            }
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit(
            "extraAnnouncedEndpoints",
            FieldValue::List(self.extra_announced_endpoints.len()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtu_minimum() {
        let mut config = KubeSpanConfig::example();
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
        config.mtu = Some(1279);
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
        config.mtu = Some(1280);
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_filters() {
        assert!(validate_filter("!10.0.0.0/8").is_ok());
        assert!(validate_filter("fd00::1").is_ok());
        assert!(validate_filter("!not-an-ip").is_err());
        assert!(validate_filter("10.0.0.0/40").is_err());
    }

    #[test]
    fn test_endpoints() {
        let mut config = KubespanEndpointsConfig::example();
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
        config.extra_announced_endpoints.push("192.168.13.46".to_string());
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }
}

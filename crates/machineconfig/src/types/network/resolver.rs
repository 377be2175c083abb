//! Name resolution and time synchronization.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::v1alpha1;
use crate::types::{api_version, is_false, kinds, parse_duration};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Upstream DNS server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameserverConfig {
    /// Server address
    pub address: String,
}

/// DNS resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Upstream servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<NameserverConfig>,

    /// Search domains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_domains: Vec<String>,

    /// Do not derive search domains from the hostname
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_default_search_domains: bool,
}

impl ResolverConfig {
    /// Parsed nameserver addresses; invalid entries are skipped.
    pub fn resolvers(&self) -> Vec<IpAddr> {
        self.nameservers
            .iter()
            .filter_map(|ns| ns.address.parse().ok())
            .collect()
    }
}

impl DocumentSpec for ResolverConfig {
    const KIND: &'static str = kinds::RESOLVER;
    const DESCRIPTION: &'static str = "DNS resolver configuration.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        ResolverConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            nameservers: vec![
                NameserverConfig {
                    address: "10.0.0.1".to_string(),
                },
                NameserverConfig {
                    address: "2001:4860:4860::8888".to_string(),
                },
            ],
            search_domains: vec!["example.org".to_string()],
            disable_default_search_domains: false,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        for ns in &self.nameservers {
            if ns.address.parse::<IpAddr>().is_err() {
                report.error(format!("nameserver {:?} is not an IP address", ns.address));
            }
        }
        if self.search_domains.len() > 6 {
            report.warn("only the first 6 search domains are used");
        }
        report
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        let legacy_set = legacy
            .machine
            .as_ref()
            .and_then(|m| m.network.as_ref())
            .is_some_and(|n| !n.nameservers.is_empty());
        if legacy_set && !self.nameservers.is_empty() {
            return Err("nameservers are already set in v1alpha1 config".to_string());
        }
        Ok(())
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("nameservers", FieldValue::List(self.nameservers.len()));
        visitor.visit("searchDomains", FieldValue::List(self.search_domains.len()));
        visitor.visit(
            "disableDefaultSearchDomains",
            FieldValue::Bool(Some(self.disable_default_search_domains)),
        );
    }
}

/// NTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NtpConfig {
    /// NTP servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,
}

/// Time synchronization configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Enable time synchronization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Time to wait for sync before continuing boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_timeout: Option<String>,

    /// NTP settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<NtpConfig>,
}

impl TimeSyncConfig {
    /// Whether synchronization is enabled; on unless disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Parsed boot timeout.
    pub fn boot_timeout(&self) -> Option<std::time::Duration> {
        self.boot_timeout
            .as_deref()
            .and_then(|t| parse_duration(t).ok())
    }
}

impl DocumentSpec for TimeSyncConfig {
    const KIND: &'static str = kinds::TIME_SYNC;
    const DESCRIPTION: &'static str = "Time synchronization configuration.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        TimeSyncConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            enabled: Some(true),
            boot_timeout: Some("2m".to_string()),
            ntp: Some(NtpConfig {
                servers: vec!["time.cloudflare.com".to_string()],
            }),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        if let Some(timeout) = &self.boot_timeout {
            report.check(parse_duration(timeout));
        }
        report
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        if legacy.machine.as_ref().is_some_and(|m| m.time.is_some()) {
            return Err("time sync is already configured in v1alpha1 machine.time".to_string());
        }
        Ok(())
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("enabled", FieldValue::Bool(Some(self.is_enabled())));
        visitor.visit("bootTimeout", FieldValue::Duration(self.boot_timeout()));
        visitor.visit(
            "ntpServers",
            FieldValue::List(self.ntp.as_ref().map_or(0, |n| n.servers.len())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver() {
        let mut config = ResolverConfig::example();
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
        assert_eq!(config.resolvers().len(), 2);

        config.nameservers.push(NameserverConfig {
            address: "dns.example.org".to_string(),
        });
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_resolver_legacy_conflict() {
        let mut legacy = v1alpha1::Config::example();
        legacy.machine.as_mut().unwrap().network = Some(v1alpha1::NetworkConfig {
            nameservers: vec!["1.1.1.1".to_string()],
            ..v1alpha1::NetworkConfig::default()
        });
        assert!(DocumentSpec::validate_legacy_conflicts(&ResolverConfig::example(), &legacy).is_err());
    }

    #[test]
    fn test_timesync() {
        let mut config = TimeSyncConfig::example();
        assert_eq!(config.boot_timeout(), Some(std::time::Duration::from_secs(120)));
        config.boot_timeout = Some("forever".to_string());
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());

        let mut legacy = v1alpha1::Config::example();
        assert!(DocumentSpec::validate_legacy_conflicts(&config, &legacy).is_ok());
        legacy.machine.as_mut().unwrap().time = Some(v1alpha1::TimeConfig::default());
        assert!(DocumentSpec::validate_legacy_conflicts(&config, &legacy).is_err());
    }
}

//! Static `/etc/hosts` entries.

use super::hostname::validate_fqdn;
use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, kinds};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Hostnames resolving to one address; the document name is the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticHostConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// IP address
    #[serde(default)]
    pub name: String,

    /// Hostnames for the address
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
}

impl DocumentSpec for StaticHostConfig {
    const KIND: &'static str = kinds::STATIC_HOST;
    const DESCRIPTION: &'static str = "Static host entry mapping an address to hostnames.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        StaticHostConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "10.5.0.2".to_string(),
            hostnames: vec!["example.com".to_string(), "example".to_string()],
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.name.parse::<IpAddr>().is_err() {
            report.error(format!("name {:?} must be an IP address", self.name));
        }
        if self.hostnames.is_empty() {
            report.error("at least one hostname must be specified");
        }
        for hostname in &self.hostnames {
            report.check(validate_fqdn(hostname));
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("hostnames", FieldValue::List(self.hostnames.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_host() {
        let mut host = StaticHostConfig::example();
        assert!(DocumentSpec::validate(&host, &ValidationMode::disk()).is_ok());
        host.name = "example".to_string();
        host.hostnames.clear();
        assert_eq!(DocumentSpec::validate(&host, &ValidationMode::disk()).errors().len(), 2);
    }
}

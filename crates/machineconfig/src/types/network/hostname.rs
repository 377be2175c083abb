//! Hostname configuration.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::v1alpha1;
use crate::types::{api_version, kinds};
use serde::{Deserialize, Serialize};

const MAX_FQDN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Automatic hostname strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoHostname {
    /// Derived from the machine identity
    Stable,
    /// No automatic hostname
    Off,
}

/// Node hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostnameConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Automatic hostname strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<AutoHostname>,

    /// Static hostname or FQDN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Checks FQDN and label length limits.
pub fn validate_fqdn(hostname: &str) -> Result<(), String> {
    if hostname.is_empty() {
        return Err("hostname cannot be empty".to_string());
    }
    if hostname.len() > MAX_FQDN_LEN {
        return Err(format!("hostname is longer than {} characters", MAX_FQDN_LEN));
    }
    for label in hostname.split('.') {
        if label.is_empty() {
            return Err(format!("hostname {:?} contains an empty label", hostname));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!("hostname label {:?} is longer than {} characters", label, MAX_LABEL_LEN));
        }
    }
    Ok(())
}

impl HostnameConfig {
    /// Short hostname without the domain part.
    pub fn short_hostname(&self) -> Option<&str> {
        self.hostname
            .as_deref()
            .and_then(|h| h.split('.').next())
    }
}

impl DocumentSpec for HostnameConfig {
    const KIND: &'static str = kinds::HOSTNAME;
    const DESCRIPTION: &'static str = "Hostname of the machine, static or automatic.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        HostnameConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            auto: None,
            hostname: Some("worker-33".to_string()),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        match (&self.auto, &self.hostname) {
            (Some(_), Some(_)) => report.error("only one of auto or hostname can be set"),
            (None, None) => report.error("either auto or hostname must be set"),
            (None, Some(hostname)) => {
                report.check(validate_fqdn(hostname));
            }
            (Some(_), None) => {}
        }
        report
    }

    fn validate_legacy_conflicts(&self, legacy: &v1alpha1::Config) -> Result<(), String> {
        if legacy.static_hostname().is_some() {
            return Err("static hostname is already set in v1alpha1 config".to_string());
        }
        if legacy.stable_hostname() {
            return Err("stable hostname is already enabled in v1alpha1 config".to_string());
        }
        Ok(())
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        let auto = self.auto.map(|a| match a {
            AutoHostname::Stable => "stable",
            AutoHostname::Off => "off",
        });
        visitor.visit("auto", FieldValue::Str(auto));
        visitor.visit("hostname", FieldValue::Str(self.hostname.as_deref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one() {
        let mut config = HostnameConfig::example();
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());

        config.auto = Some(AutoHostname::Stable);
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());

        config.hostname = None;
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());

        config.auto = None;
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_fqdn_limits() {
        assert!(validate_fqdn("node-1.example.com").is_ok());
        assert!(validate_fqdn(&"a".repeat(64)).is_err());
        let long = vec!["a".repeat(60); 5].join(".");
        assert!(validate_fqdn(&long).is_err());
        assert!(validate_fqdn("a..b").is_err());
    }

    #[test]
    fn test_legacy_conflict() {
        let config = HostnameConfig::example();
        let mut legacy = v1alpha1::Config::example();
        assert!(DocumentSpec::validate_legacy_conflicts(&config, &legacy).is_ok());

        legacy.machine.as_mut().unwrap().features = Some(v1alpha1::FeaturesConfig {
            stable_hostname: Some(true),
            ..v1alpha1::FeaturesConfig::default()
        });
        assert!(DocumentSpec::validate_legacy_conflicts(&config, &legacy).is_err());
    }
}

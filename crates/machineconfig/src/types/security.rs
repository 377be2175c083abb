//! Trusted roots and container image signature verification.

use crate::document::{
    DocumentSpec, DocumentVisitor, FieldValue, MergeKey, ValidationMode, ValidationReport,
};
use crate::types::cri::validate_certificates;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// Extra CA certificates trusted by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRootsConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Bundle name
    #[serde(default)]
    pub name: String,

    /// PEM certificates
    #[serde(default)]
    pub certificates: String,
}

impl DocumentSpec for TrustedRootsConfig {
    const KIND: &'static str = kinds::TRUSTED_ROOTS;
    const DESCRIPTION: &'static str = "Additional trusted CA certificates.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        TrustedRootsConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "my-enterprise-ca".to_string(),
            certificates: "-----BEGIN CERTIFICATE-----\nMIIBAjCBqaADAgECAgEAMAoGCCqGSM49BAMCMAAwHhcNMjQwMTAxMDAwMDAwWhcN\n-----END CERTIFICATE-----\n".to_string(),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        report.check(validate_certificates("certificates", &self.certificates));
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("certificates", FieldValue::Str(Some(&self.certificates)));
    }
}

/// Keyless (OIDC identity) verifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeylessVerifier {
    /// OIDC issuer
    #[serde(default)]
    pub issuer: String,

    /// Exact certificate subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Certificate subject regular expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_regex: Option<String>,
}

/// Public key verifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicKeyVerifier {
    /// PEM certificate or public key
    #[serde(default)]
    pub certificate: String,
}

/// Verification rule for images matching a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageVerificationRule {
    /// Image reference glob
    #[serde(default)]
    pub image_pattern: String,

    /// Require a valid signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,

    /// Keyless verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyless: Option<KeylessVerifier>,

    /// Public key verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicKeyVerifier>,
}

impl ImageVerificationRule {
    /// Validates a single rule.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.image_pattern.is_empty() {
            report.error("imagePattern must be specified");
        }

        let verify = self.verify.unwrap_or(false);
        let verifiers = usize::from(self.keyless.is_some()) + usize::from(self.public_key.is_some());
        if verify && verifiers != 1 {
            report.error("exactly one of keyless or publicKey must be set when verify is true");
        }
        if !verify && verifiers > 0 {
            report.error("verify must be true when a verifier is configured");
        }

        if let Some(keyless) = &self.keyless {
            if keyless.issuer.is_empty() {
                report.error("keyless.issuer must be specified");
            }
            let subject = keyless.subject.as_deref().is_some_and(|s| !s.is_empty());
            let regex = keyless.subject_regex.as_deref().is_some_and(|s| !s.is_empty());
            if !subject && !regex {
                report.error("keyless requires subject or subjectRegex");
            }
        }
        if let Some(key) = &self.public_key {
            if key.certificate.trim().is_empty() {
                report.error("publicKey.certificate must be specified");
            }
        }
        report
    }
}

/// Container image signature verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageVerificationConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Rules, first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ImageVerificationRule>,
}

impl ImageVerificationConfig {
    /// First rule matching `pattern` exactly.
    pub fn rule(&self, pattern: &str) -> Option<&ImageVerificationRule> {
        self.rules.iter().find(|r| r.image_pattern == pattern)
    }
}

impl DocumentSpec for ImageVerificationConfig {
    const KIND: &'static str = kinds::IMAGE_VERIFICATION;
    const DESCRIPTION: &'static str = "Signature verification rules for container images.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        ImageVerificationConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            rules: vec![
                ImageVerificationRule {
                    image_pattern: "ghcr.io/siderolabs/*".to_string(),
                    verify: Some(true),
                    keyless: Some(KeylessVerifier {
                        issuer: "https://accounts.google.com".to_string(),
                        subject: Some("builder@example.com".to_string()),
                        subject_regex: None,
                    }),
                    public_key: None,
                },
                ImageVerificationRule {
                    image_pattern: "docker.io/library/*".to_string(),
                    verify: Some(false),
                    keyless: None,
                    public_key: None,
                },
            ],
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        for (i, rule) in self.rules.iter().enumerate() {
            report.extend(rule.validate().with_context(&format!("rules[{}]", i)));
        }
        report
    }

    fn merge_keys() -> &'static [MergeKey] {
        &[MergeKey {
            field: "rules",
            key: "imagePattern",
        }]
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("rules", FieldValue::List(self.rules.len()));
    }
}

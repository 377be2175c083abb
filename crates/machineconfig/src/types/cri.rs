//! Container registry mirrors, credentials and TLS settings.
//!
//! Each document is named after the registry host it applies to
//! (`docker.io`, `ghcr.io`, or `*` for every registry).

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, is_false, kinds, require_name};
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use url::Url;

/// Mirror endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEndpoint {
    /// Mirror URL
    pub url: String,

    /// Do not fall back to the upstream registry
    #[serde(default, skip_serializing_if = "is_false")]
    pub override_path: bool,
}

/// Mirrors of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMirrorConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Registry host
    #[serde(default)]
    pub name: String,

    /// Mirror endpoints, tried in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<RegistryEndpoint>,

    /// Skip the upstream registry when every mirror fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_fallback: Option<bool>,
}

impl DocumentSpec for RegistryMirrorConfig {
    const KIND: &'static str = kinds::REGISTRY_MIRROR;
    const DESCRIPTION: &'static str = "Mirror endpoints for a container image registry.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        RegistryMirrorConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "docker.io".to_string(),
            endpoints: vec![RegistryEndpoint {
                url: "https://mirror.gcr.io".to_string(),
                override_path: false,
            }],
            skip_fallback: None,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        for endpoint in &self.endpoints {
            match Url::parse(&endpoint.url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => report.error(format!(
                    "endpoint {:?} has unsupported scheme {:?}",
                    endpoint.url,
                    url.scheme()
                )),
                Err(e) => report.error(format!("endpoint {:?} is invalid: {}", endpoint.url, e)),
            }
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("endpoints", FieldValue::List(self.endpoints.len()));
        visitor.visit("skipFallback", FieldValue::Bool(self.skip_fallback));
    }
}

/// Credentials for a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAuthConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Registry host
    #[serde(default)]
    pub name: String,

    /// Username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password (secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Base64 `user:password` (secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    /// Identity token (secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
}

fn redact_option(value: &mut Option<String>, replacement: &str) {
    if value.is_some() {
        *value = Some(replacement.to_string());
    }
}

impl DocumentSpec for RegistryAuthConfig {
    const KIND: &'static str = kinds::REGISTRY_AUTH;
    const DESCRIPTION: &'static str = "Credentials for a container image registry.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        RegistryAuthConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "my-private-registry.local:5000".to_string(),
            username: Some("my-username".to_string()),
            password: Some("my-password".to_string()),
            auth: None,
            identity_token: None,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));

        let basic = self.username.is_some() || self.password.is_some();
        let methods = [basic, self.auth.is_some(), self.identity_token.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if methods > 1 {
            report.error("only one of username/password, auth, or identityToken can be set");
        }
        if self.password.is_some() && self.username.is_none() {
            report.error("password requires username");
        }
        report
    }

    fn redact(&mut self, replacement: &str) {
        redact_option(&mut self.password, replacement);
        redact_option(&mut self.auth, replacement);
        redact_option(&mut self.identity_token, replacement);
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("username", FieldValue::Str(self.username.as_deref()));
        visitor.visit("password", FieldValue::Str(self.password.as_deref()));
        visitor.visit("auth", FieldValue::Str(self.auth.as_deref()));
        visitor.visit("identityToken", FieldValue::Str(self.identity_token.as_deref()));
    }
}

/// Client certificate and key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// PEM certificate
    #[serde(default)]
    pub crt: String,

    /// PEM private key (secret)
    #[serde(default)]
    pub key: String,
}

/// TLS settings for a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryTlsConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Registry host
    #[serde(default)]
    pub name: String,

    /// Client certificate for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identity: Option<ClientIdentity>,

    /// PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Skip server certificate verification
    #[serde(default, skip_serializing_if = "is_false")]
    pub insecure_skip_verify: bool,
}

/// Checks that `pem` holds at least one certificate.
pub fn validate_certificates(field: &str, pem: &str) -> Result<usize, String> {
    let mut reader = BufReader::new(pem.as_bytes());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{} is not valid PEM: {}", field, e))?;
    if certs.is_empty() {
        return Err(format!("{} does not contain any certificates", field));
    }
    Ok(certs.len())
}

/// Checks that `pem` holds a private key.
pub fn validate_private_key(field: &str, pem: &str) -> Result<(), String> {
    let mut reader = BufReader::new(pem.as_bytes());
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(format!("{} does not contain a private key", field)),
        Err(e) => Err(format!("{} is not valid PEM: {}", field, e)),
    }
}

impl DocumentSpec for RegistryTlsConfig {
    const KIND: &'static str = kinds::REGISTRY_TLS;
    const DESCRIPTION: &'static str = "TLS settings for a container image registry.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        RegistryTlsConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "my-private-registry.local:5000".to_string(),
            client_identity: None,
            ca: None,
            insecure_skip_verify: true,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if let Some(ca) = &self.ca {
            report.check(validate_certificates("ca", ca));
        }
        if let Some(identity) = &self.client_identity {
            report.check(validate_certificates("clientIdentity.crt", &identity.crt));
            report.check(validate_private_key("clientIdentity.key", &identity.key));
        }
        if self.insecure_skip_verify && self.ca.is_some() {
            report.warn("ca is ignored when insecureSkipVerify is set");
        }
        report
    }

    fn redact(&mut self, replacement: &str) {
        if let Some(identity) = &mut self.client_identity {
            if !identity.key.is_empty() {
                identity.key = replacement.to_string();
            }
        }
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("ca", FieldValue::Str(self.ca.as_deref()));
        visitor.visit("clientIdentity", FieldValue::Bool(Some(self.client_identity.is_some())));
        visitor.visit("insecureSkipVerify", FieldValue::Bool(Some(self.insecure_skip_verify)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_schemes() {
        let mut mirror = RegistryMirrorConfig::example();
        assert!(DocumentSpec::validate(&mirror, &ValidationMode::disk()).is_ok());

        mirror.endpoints.push(RegistryEndpoint {
            url: "ftp://mirror.local".to_string(),
            override_path: false,
        });
        mirror.endpoints.push(RegistryEndpoint {
            url: "not a url".to_string(),
            override_path: false,
        });
        assert_eq!(DocumentSpec::validate(&mirror, &ValidationMode::disk()).errors().len(), 2);
    }

    #[test]
    fn test_auth_at_most_one_method() {
        let mut auth = RegistryAuthConfig::example();
        assert!(DocumentSpec::validate(&auth, &ValidationMode::disk()).is_ok());

        auth.identity_token = Some("token".to_string());
        assert!(!DocumentSpec::validate(&auth, &ValidationMode::disk()).is_ok());

        auth.username = None;
        auth.password = None;
        assert!(DocumentSpec::validate(&auth, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_auth_redact_idempotent() {
        let mut auth = RegistryAuthConfig::example();
        DocumentSpec::redact(&mut auth, "X");
        let once = auth.clone();
        DocumentSpec::redact(&mut auth, "X");
        assert_eq!(auth, once);
        assert_eq!(auth.username.as_deref(), Some("my-username"));
        assert_eq!(auth.password.as_deref(), Some("X"));
    }

    #[test]
    fn test_tls_pem() {
        let mut tls = RegistryTlsConfig::example();
        tls.ca = Some("not pem".to_string());
        let report = DocumentSpec::validate(&tls, &ValidationMode::disk());
        assert!(report.errors()[0].contains("ca does not contain any certificates"));
        assert_eq!(report.warnings().len(), 1);

        tls.ca = None;
        tls.client_identity = Some(ClientIdentity {
            crt: String::new(),
            key: String::new(),
        });
        assert_eq!(DocumentSpec::validate(&tls, &ValidationMode::disk()).errors().len(), 2);
    }
}

//! WireGuard links.

use super::link::{CommonLinkConfig, legacy_link_conflict};
use crate::document::{
    ConflictClass, DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport,
};
use crate::net::Prefix;
use crate::types::v1alpha1;
use crate::types::{api_version, kinds, parse_duration, require_name};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Checks that `key` is a base64-encoded 32-byte WireGuard key.
pub fn validate_key(field: &str, key: &str) -> Result<(), String> {
    match STANDARD.decode(key) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        Ok(bytes) => Err(format!("{} must be 32 bytes, got {}", field, bytes.len())),
        Err(e) => Err(format!("{} is not valid base64: {}", field, e)),
    }
}

/// WireGuard peer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardPeer {
    /// Peer public key
    pub public_key: String,

    /// Pre-shared key (secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,

    /// `host:port` of the peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Keepalive interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive_interval: Option<String>,

    /// Prefixes routed to the peer
    #[serde(default, rename = "allowedIPs", skip_serializing_if = "Vec::is_empty")]
    pub allowed_ips: Vec<String>,
}

/// Configuration of a WireGuard link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Link name
    #[serde(default)]
    pub name: String,

    /// Private key (secret)
    #[serde(default)]
    pub private_key: String,

    /// UDP listen port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,

    /// Firewall mark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_mark: Option<u32>,

    /// Peers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<WireguardPeer>,

    /// Shared link settings
    #[serde(flatten)]
    pub link: CommonLinkConfig,
}

impl DocumentSpec for WireguardConfig {
    const KIND: &'static str = kinds::WIREGUARD;
    const DESCRIPTION: &'static str = "Configuration of a WireGuard network link.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        WireguardConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "wg1".to_string(),
            private_key: "sF45u5ePau58WeeCUY3T8D9foEKaQ8Opx4cGC8g4XE4=".to_string(),
            listen_port: Some(51820),
            firewall_mark: None,
            peers: vec![WireguardPeer {
                public_key: "ONs4OaDjJfXRr4BW0WbnuHN2XQOhcnXiA3Hmg6rLXhE=".to_string(),
                preshared_key: None,
                endpoint: Some("192.168.1.3:51820".to_string()),
                persistent_keepalive_interval: Some("25s".to_string()),
                allowed_ips: vec!["10.2.0.0/16".to_string()],
            }],
            link: CommonLinkConfig {
                up: Some(true),
                ..CommonLinkConfig::default()
            },
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        report.check(validate_key("privateKey", &self.private_key));

        for (i, peer) in self.peers.iter().enumerate() {
            let mut peer_report = ValidationReport::new();
            peer_report.check(validate_key("publicKey", &peer.public_key));
            if let Some(psk) = &peer.preshared_key {
                peer_report.check(validate_key("presharedKey", psk));
            }
            if let Some(interval) = &peer.persistent_keepalive_interval {
                peer_report.check(parse_duration(interval));
            }
            for allowed in &peer.allowed_ips {
                if let Err(e) = allowed.parse::<Prefix>() {
                    peer_report.error(format!("allowedIPs {:?} is invalid: {}", allowed, e));
                }
            }
            report.extend(peer_report.with_context(&format!("peers[{}]", i)));
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

    fn redact(&mut self, replacement: &str) {
        if !self.private_key.is_empty() {
            self.private_key = replacement.to_string();
        }
        for peer in &mut self.peers {
            if peer.preshared_key.is_some() {
                peer.preshared_key = Some(replacement.to_string());
            }
        }
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("listenPort", FieldValue::UInt(self.listen_port.map(u64::from)));
        visitor.visit("firewallMark", FieldValue::UInt(self.firewall_mark.map(u64::from)));
        visitor.visit("peers", FieldValue::List(self.peers.len()));
        self.link.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_validates() {
        let wg = WireguardConfig::example();
        let report = DocumentSpec::validate(&wg, &ValidationMode::disk());
        assert!(report.is_ok(), "{:?}", report.errors());
    }

    #[test]
    fn test_bad_keys() {
        let mut wg = WireguardConfig::example();
        wg.private_key = "short".to_string();
        wg.peers[0].public_key = "AAAA".to_string();
        let report = DocumentSpec::validate(&wg, &ValidationMode::disk());
        assert_eq!(report.errors().len(), 2);
        assert!(report.errors()[1].starts_with("peers[0]: publicKey"));
    }

    #[test]
    fn test_redact() {
        let mut wg = WireguardConfig::example();
        wg.peers[0].preshared_key = Some("secret".to_string());
        DocumentSpec::redact(&mut wg, "XXX");
        assert_eq!(wg.private_key, "XXX");
        assert_eq!(wg.peers[0].preshared_key.as_deref(), Some("XXX"));
        assert_eq!(wg.peers[0].public_key, WireguardConfig::example().peers[0].public_key);
    }
}

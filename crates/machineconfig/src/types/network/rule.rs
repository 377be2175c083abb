//! Ingress firewall rules.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::net::parse_ip_or_prefix;
use crate::types::{api_version, kinds, require_name};
use serde::{Deserialize, Serialize};

/// A port or a `lo-hi` port range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortRange {
    /// Single port
    Single(u16),
    /// Inclusive range written as `lo-hi`
    Range(String),
}

impl PortRange {
    /// Inclusive bounds of the range.
    pub fn bounds(&self) -> Result<(u16, u16), String> {
        match self {
            PortRange::Single(port) => Ok((*port, *port)),
            PortRange::Range(range) => {
                let parse = |s: &str| {
                    s.trim()
                        .parse::<u16>()
                        .map_err(|_| format!("port range {:?} is invalid", range))
                };
                match range.split_once('-') {
                    Some((lo, hi)) => {
                        let (lo, hi) = (parse(lo)?, parse(hi)?);
                        if lo > hi {
                            return Err(format!("port range {:?} has lo > hi", range));
                        }
                        Ok((lo, hi))
                    }
                    None => parse(range).map(|p| (p, p)),
                }
            }
        }
    }
}

/// Ports and protocol matched by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortSelector {
    /// Matched ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortRange>,

    /// `tcp` or `udp`
    #[serde(default)]
    pub protocol: String,
}

/// Source subnet allowed by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngressRule {
    /// Allowed subnet
    pub subnet: String,

    /// Subnet excluded from `subnet`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<String>,
}

/// Named ingress firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRuleConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Rule name
    #[serde(default)]
    pub name: String,

    /// Matched ports
    #[serde(default)]
    pub port_selector: PortSelector,

    /// Allowed sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<IngressRule>,
}

impl DocumentSpec for NetworkRuleConfig {
    const KIND: &'static str = kinds::RULE;
    const DESCRIPTION: &'static str = "Ingress firewall rule matching ports and source subnets.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        NetworkRuleConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "ingress-apid".to_string(),
            port_selector: PortSelector {
                ports: vec![PortRange::Single(50000), PortRange::Range("10250-10260".to_string())],
                protocol: "tcp".to_string(),
            },
            ingress: vec![IngressRule {
                subnet: "192.168.0.0/16".to_string(),
                except: Some("192.168.0.3/32".to_string()),
            }],
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));

        if self.port_selector.protocol != "tcp" && self.port_selector.protocol != "udp" {
            report.error(format!(
                "portSelector.protocol {:?} must be tcp or udp",
                self.port_selector.protocol
            ));
        }

        let mut ranges: Vec<(u16, u16)> = self
            .port_selector
            .ports
            .iter()
            .filter_map(|p| report.check(p.bounds()))
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            if pair[1].0 <= pair[0].1 {
                report.error(format!(
                    "port ranges {}-{} and {}-{} overlap",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                ));
            }
        }

        for (i, rule) in self.ingress.iter().enumerate() {
            if let Err(e) = parse_ip_or_prefix(&rule.subnet) {
                report.error(format!("ingress[{}]: subnet: {}", i, e));
            }
            if let Some(except) = &rule.except {
                if let Err(e) = parse_ip_or_prefix(except) {
                    report.error(format!("ingress[{}]: except: {}", i, e));
                }
            }
        }

        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("protocol", FieldValue::Str(Some(&self.port_selector.protocol)));
        visitor.visit("ports", FieldValue::List(self.port_selector.ports.len()));
        visitor.visit("ingress", FieldValue::List(self.ingress.len()));
    }
}

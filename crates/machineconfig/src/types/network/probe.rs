//! TCP connectivity probes.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, kinds, parse_duration, require_name};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between probe attempts.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Default timeout of a probe attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Named TCP probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpProbeConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// Probe name
    #[serde(default)]
    pub name: String,

    /// `host:port` to connect to
    #[serde(default)]
    pub endpoint: String,

    /// Interval between attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Timeout of an attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Failed attempts before the probe is reported down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<i64>,
}

impl TcpProbeConfig {
    /// Interval, defaulting to one second.
    pub fn interval(&self) -> Duration {
        self.interval
            .as_deref()
            .and_then(|v| parse_duration(v).ok())
            .unwrap_or(DEFAULT_PROBE_INTERVAL)
    }

    /// Timeout, defaulting to ten seconds.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .as_deref()
            .and_then(|v| parse_duration(v).ok())
            .unwrap_or(DEFAULT_PROBE_TIMEOUT)
    }

    /// Failure threshold, zero when unset.
    pub fn failure_threshold(&self) -> u64 {
        self.failure_threshold
            .and_then(|t| u64::try_from(t).ok())
            .unwrap_or(0)
    }
}

fn check_duration(report: &mut ValidationReport, field: &str, value: Option<&str>) {
    let Some(value) = value else { return };
    // negative durations are not representable; reject them explicitly
    if value.trim_start().starts_with('-') {
        report.error(format!("{} {:?} must be non-negative", field, value));
        return;
    }
    if let Err(e) = parse_duration(value) {
        report.error(format!("{}: {}", field, e));
    }
}

impl DocumentSpec for TcpProbeConfig {
    const KIND: &'static str = kinds::TCP_PROBE;
    const DESCRIPTION: &'static str = "TCP connectivity probe.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn example() -> Self {
        TcpProbeConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            name: "proxy-check".to_string(),
            endpoint: "proxy.example.com:3128".to_string(),
            interval: Some("1s".to_string()),
            timeout: Some("10s".to_string()),
            failure_threshold: Some(3),
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        report.check(require_name(&self.name));
        if self.endpoint.is_empty() {
            report.error("endpoint must be specified");
        }
        check_duration(&mut report, "interval", self.interval.as_deref());
        check_duration(&mut report, "timeout", self.timeout.as_deref());
        if self.failure_threshold.is_some_and(|t| t < 0) {
            report.error("failureThreshold must be non-negative");
        }
        report
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("name", FieldValue::Str(Some(&self.name)));
        visitor.visit("endpoint", FieldValue::Str(Some(&self.endpoint)));
        visitor.visit("interval", FieldValue::Duration(Some(self.interval())));
        visitor.visit("timeout", FieldValue::Duration(Some(self.timeout())));
        visitor.visit("failureThreshold", FieldValue::UInt(Some(self.failure_threshold())));
    }
}

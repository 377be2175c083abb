//! Runtime configuration loaded from environment variables.

use crate::error::ControllerError;
use machineconfig::ValidationMode;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Where the persisted configuration is read from at boot.
pub const DEFAULT_STATE_CONFIG_PATH: &str = "/system/state/config.yaml";

/// Default kernel command line location.
pub const DEFAULT_CMDLINE_PATH: &str = "/proc/cmdline";

/// Default siderolink status probe interval.
pub const DEFAULT_SIDEROLINK_STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Where the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Bare metal or virtual machine
    #[default]
    Metal,
    /// Container
    Container,
}

impl Mode {
    /// Validation mode applied to configurations fetched from the platform.
    pub fn validation_mode(&self) -> ValidationMode {
        match self {
            Mode::Metal => ValidationMode::metal(),
            Mode::Container => ValidationMode::container(),
        }
    }
}

/// machined settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MachinedConfig {
    /// Persisted configuration read by the disk acquisition step
    pub state_config_path: PathBuf,
    /// Kernel command line
    pub cmdline_path: PathBuf,
    /// Where the node runs
    pub mode: Mode,
    /// Hardware UUID sent when provisioning siderolink
    pub node_uuid: Option<String>,
    /// Unique token sent when provisioning siderolink
    pub unique_token: Option<String>,
    /// Siderolink status probe interval
    pub siderolink_status_interval: Duration,
    /// Kubeconfig used by the kubeaccess and diagnostics controllers
    pub kubeconfig: Option<PathBuf>,
    /// Node name used by Kubernetes-facing checks
    pub node_name: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for MachinedConfig {
    fn default() -> Self {
        Self {
            state_config_path: PathBuf::from(DEFAULT_STATE_CONFIG_PATH),
            cmdline_path: PathBuf::from(DEFAULT_CMDLINE_PATH),
            mode: Mode::default(),
            node_uuid: None,
            unique_token: None,
            siderolink_status_interval: DEFAULT_SIDEROLINK_STATUS_INTERVAL,
            kubeconfig: None,
            node_name: None,
            log_format: LogFormat::default(),
        }
    }
}

impl MachinedConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mode = match non_empty("MACHINED_MODE").as_deref() {
            None | Some("metal") => Mode::Metal,
            Some("container") => Mode::Container,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "MACHINED_MODE must be \"metal\" or \"container\", got {:?}",
                    other
                )));
            }
        };

        let log_format = match non_empty("MACHINED_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "MACHINED_LOG_FORMAT must be \"text\" or \"json\", got {:?}",
                    other
                )));
            }
        };

        let siderolink_status_interval = match non_empty("MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS") {
            None => defaults.siderolink_status_interval,
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ControllerError::InvalidConfig(format!(
                        "MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS must be a number of seconds, got {:?}",
                        raw
                    ))
                })?;
                if secs == 0 {
                    return Err(ControllerError::InvalidConfig(
                        "MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS must be positive".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            state_config_path: non_empty("MACHINED_STATE_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_config_path),
            cmdline_path: non_empty("MACHINED_CMDLINE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cmdline_path),
            mode,
            node_uuid: non_empty("MACHINED_NODE_UUID"),
            unique_token: non_empty("MACHINED_UNIQUE_TOKEN"),
            siderolink_status_interval,
            kubeconfig: non_empty("MACHINED_KUBECONFIG").map(PathBuf::from),
            node_name: non_empty("MACHINED_NODE_NAME"),
            log_format,
        })
    }

    /// Log the effective configuration.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  State config: {}", self.state_config_path.display());
        info!("  Kernel cmdline: {}", self.cmdline_path.display());
        info!("  Mode: {:?}", self.mode);
        info!("  Node UUID: {}", self.node_uuid.as_deref().unwrap_or("unset"));
        info!("  Siderolink status interval: {:?}", self.siderolink_status_interval);
        info!(
            "  Kubeconfig: {}",
            self.kubeconfig
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unset, Kubernetes controllers disabled".to_string())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<MachinedConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MachinedConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, MachinedConfig::default());
        assert_eq!(config.state_config_path, PathBuf::from("/system/state/config.yaml"));
        assert_eq!(config.siderolink_status_interval, Duration::from_secs(30));
        assert!(!config.mode.validation_mode().in_container());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MACHINED_STATE_CONFIG_PATH", "/tmp/config.yaml"),
            ("MACHINED_MODE", "container"),
            ("MACHINED_NODE_UUID", "71233efd-7a07-43f8-b6ba-da90fbe7e3e0"),
            ("MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS", "5"),
            ("MACHINED_LOG_FORMAT", "json"),
            ("MACHINED_UNIQUE_TOKEN", ""),
        ])
        .unwrap();

        assert_eq!(config.state_config_path, PathBuf::from("/tmp/config.yaml"));
        assert_eq!(config.mode, Mode::Container);
        assert!(config.mode.validation_mode().in_container());
        assert_eq!(config.node_uuid.as_deref(), Some("71233efd-7a07-43f8-b6ba-da90fbe7e3e0"));
        assert_eq!(config.unique_token, None);
        assert_eq!(config.siderolink_status_interval, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("MACHINED_MODE", "cloud")]), Err(ControllerError::InvalidConfig(_))));
        assert!(load(&[("MACHINED_LOG_FORMAT", "xml")]).is_err());
        assert!(load(&[("MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS", "soon")]).is_err());
        assert!(load(&[("MACHINED_SIDEROLINK_STATUS_INTERVAL_SECS", "0")]).is_err());
    }
}

//! Kernel command line parsing

use std::path::Path;

/// Names the platform to fetch the configuration from.
pub const PLATFORM_PARAM: &str = "talos.platform";

/// URL of the machine configuration, or `none`.
pub const CONFIG_PARAM: &str = "talos.config";

/// URL of the management API.
pub const SIDEROLINK_API_PARAM: &str = "siderolink.api";

/// Parsed kernel command line.
///
/// Parameters are `key=value` or bare `key` words separated by whitespace.
/// A parameter given more than once keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmdline {
    params: Vec<(String, Option<String>)>,
}

impl Cmdline {
    /// Parse a raw command line.
    pub fn parse(raw: &str) -> Self {
        let params = raw
            .split_whitespace()
            .map(|word| match word.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (word.to_string(), None),
            })
            .collect();

        Self { params }
    }

    /// Read and parse the command line at `path` (normally `/proc/cmdline`).
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&raw))
    }

    /// Last value of `key`; bare words yield an empty string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Whether `key` appears at all.
    pub fn contains(&self, key: &str) -> bool {
        self.params.iter().any(|(k, _)| k == key)
    }

    /// Management API URL given on the command line.
    pub fn siderolink_api(&self) -> Option<&str> {
        self.get(SIDEROLINK_API_PARAM).filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_values_and_words() {
        let cmdline = Cmdline::parse("console=ttyS0 quiet talos.config=http://10.5.0.1/config.yaml\n");
        assert_eq!(cmdline.get("console"), Some("ttyS0"));
        assert_eq!(cmdline.get("quiet"), Some(""));
        assert_eq!(cmdline.get(CONFIG_PARAM), Some("http://10.5.0.1/config.yaml"));
        assert_eq!(cmdline.get("missing"), None);
        assert!(cmdline.contains("quiet"));
    }

    #[test]
    fn test_last_value_wins() {
        let cmdline = Cmdline::parse("console=tty0 console=ttyS0");
        assert_eq!(cmdline.get("console"), Some("ttyS0"));
    }

    #[test]
    fn test_value_keeps_equals_signs() {
        let cmdline = Cmdline::parse("siderolink.api=https://siderolink.api/?jointoken=secret");
        assert_eq!(cmdline.siderolink_api(), Some("https://siderolink.api/?jointoken=secret"));
        assert_eq!(Cmdline::parse("siderolink.api").siderolink_api(), None);
    }

    #[tokio::test]
    async fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdline");
        std::fs::write(&path, "talos.platform=metal\n").unwrap();

        let cmdline = Cmdline::read(&path).await.unwrap();
        assert_eq!(cmdline.get(PLATFORM_PARAM), Some("metal"));
    }
}

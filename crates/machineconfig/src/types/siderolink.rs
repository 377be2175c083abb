//! Out-of-band management access over SideroLink.

use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::types::{api_version, kinds};
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameter carrying the join token.
pub const JOIN_TOKEN_PARAM: &str = "jointoken";

/// SideroLink API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideroLinkConfig {
    /// Scheme version
    #[serde(default = "api_version")]
    pub api_version: String,

    /// Kind name
    pub kind: String,

    /// API URL, the join token travels as a query parameter
    #[serde(default, rename = "apiUrl")]
    pub api_url: String,

    /// Token identifying the node to the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_token: Option<String>,
}

impl SideroLinkConfig {
    /// Parsed API URL.
    pub fn url(&self) -> Option<Url> {
        Url::parse(&self.api_url).ok()
    }

    /// Bare host of the API URL.
    pub fn host(&self) -> Option<String> {
        self.url()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Join token from the URL query.
    pub fn join_token(&self) -> Option<String> {
        self.url().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == JOIN_TOKEN_PARAM)
                .map(|(_, v)| v.into_owned())
        })
    }

    /// Whether the API is reached without TLS.
    pub fn insecure(&self) -> bool {
        self.url().is_some_and(|u| u.scheme() == "http")
    }
}

/// Replaces the join token in `url`, leaving other parameters untouched.
pub fn redact_join_token(url: &str, replacement: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == JOIN_TOKEN_PARAM {
                replacement.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    if pairs.is_empty() {
        return url.to_string();
    }
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}

impl DocumentSpec for SideroLinkConfig {
    const KIND: &'static str = kinds::SIDEROLINK;
    const DESCRIPTION: &'static str = "SideroLink API endpoint for out-of-band management.";

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn example() -> Self {
        SideroLinkConfig {
            api_version: api_version(),
            kind: Self::KIND.to_string(),
            api_url: "https://siderolink.api/?jointoken=secret".to_string(),
            unique_token: None,
        }
    }

    fn validate(&self, _mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();
        match Url::parse(&self.api_url) {
            Ok(url) if matches!(url.scheme(), "https" | "http" | "grpc") => {
                if url.host_str().is_none() {
                    report.error(format!("apiUrl {:?} has no host", self.api_url));
                }
                if url.scheme() == "http" {
                    report.warn("apiUrl uses an insecure connection");
                }
            }
            Ok(url) => report.error(format!("apiUrl scheme {:?} is not supported", url.scheme())),
            Err(e) => report.error(format!("apiUrl {:?} is invalid: {}", self.api_url, e)),
        }
        report
    }

    fn redact(&mut self, replacement: &str) {
        self.api_url = redact_join_token(&self.api_url, replacement);
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("apiUrl", FieldValue::Str(Some(&self.api_url)));
        visitor.visit("host", FieldValue::Str(self.host().as_deref()));
        visitor.visit("joinToken", FieldValue::Str(self.join_token().as_deref()));
        visitor.visit("uniqueToken", FieldValue::Str(self.unique_token.as_deref()));
        visitor.visit("insecure", FieldValue::Bool(Some(self.insecure())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_getters() {
        let mut config = SideroLinkConfig::example();
        config.api_url = "https://siderolink.api/?jointoken=secret&user=alice".to_string();
        assert_eq!(config.host().as_deref(), Some("siderolink.api"));
        assert_eq!(config.join_token().as_deref(), Some("secret"));
        assert!(!config.insecure());
    }

    #[test]
    fn test_redact_keeps_other_params() {
        let mut config = SideroLinkConfig::example();
        config.api_url = "https://siderolink.api/?jointoken=secret&user=alice".to_string();
        DocumentSpec::redact(&mut config, "******");
        assert_eq!(config.api_url, "https://siderolink.api/?jointoken=******&user=alice");

        let once = config.clone();
        DocumentSpec::redact(&mut config, "******");
        assert_eq!(config, once);
    }

    #[test]
    fn test_redact_without_query() {
        assert_eq!(redact_join_token("https://siderolink.api", "X"), "https://siderolink.api");
    }

    #[test]
    fn test_validate() {
        let mut config = SideroLinkConfig::example();
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
        config.api_url = "ftp://siderolink.api".to_string();
        assert!(!DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }
}

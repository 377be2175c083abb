//! Provisioning API client
//!
//! Talks JSON over HTTP(S) to `<api>/provision`. `grpc://` URLs are reached
//! over TLS, or in plain text when the link is configured as insecure.

use crate::error::ProvisionError;
use crate::models::{ProvisionRequest, ProvisionResponse};
use crate::provision_trait::ProvisionClient;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Provisioning API client
#[derive(Debug, Clone)]
pub struct SiderolinkClient {
    client: Client,
    base_url: Url,
}

impl SiderolinkClient {
    /// Create a new client for `api_url`.
    ///
    /// Query parameters of the URL (the join token among them) are not sent
    /// as part of the endpoint; the caller passes the token in the request.
    pub fn new(api_url: &str, insecure: bool) -> Result<Self, ProvisionError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url(api_url, insecure)?,
        })
    }

    /// Endpoint the client sends requests to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn base_url(api_url: &str, insecure: bool) -> Result<Url, ProvisionError> {
    let parsed = Url::parse(api_url).map_err(|e| ProvisionError::InvalidUrl(format!("{}: {}", api_url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ProvisionError::InvalidUrl(format!("{}: missing host", api_url)))?;

    let scheme = match parsed.scheme() {
        "https" => "https",
        "http" => "http",
        "grpc" if insecure => "http",
        "grpc" => "https",
        other => return Err(ProvisionError::InvalidUrl(format!("{}: unsupported scheme {:?}", api_url, other))),
    };

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Url::parse(&format!("{}://{}/", scheme, authority)).map_err(|e| ProvisionError::InvalidUrl(e.to_string()))
}

#[async_trait::async_trait]
impl ProvisionClient for SiderolinkClient {
    async fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, ProvisionError> {
        let url = self
            .base_url
            .join("provision")
            .map_err(|e| ProvisionError::InvalidUrl(e.to_string()))?;
        debug!("Provisioning node {} via {}", request.node_uuid, url);

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => Ok(serde_json::from_str(&body)?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProvisionError::PermissionDenied(body)),
            _ => Err(ProvisionError::Api(format!("{} - {}", status, body))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_port_and_drops_query() {
        let url = base_url("https://siderolink.api:8099/?jointoken=secret", false).unwrap();
        assert_eq!(url.as_str(), "https://siderolink.api:8099/");
    }

    #[test]
    fn test_base_url_grpc_scheme() {
        assert_eq!(base_url("grpc://api.example", false).unwrap().as_str(), "https://api.example/");
        assert_eq!(base_url("grpc://api.example", true).unwrap().as_str(), "http://api.example/");
    }

    #[test]
    fn test_base_url_rejects_unknown_scheme() {
        let err = base_url("ftp://api.example", false).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidUrl(_)));
        assert!(base_url("not a url", false).is_err());
    }
}

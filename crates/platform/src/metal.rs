//! Bare-metal platform
//!
//! Downloads the configuration from the URL given as `talos.config=` on the
//! kernel command line. `talos.config=none` or a missing parameter means the
//! node waits for a configuration in maintenance mode.

use crate::cmdline::{CONFIG_PARAM, Cmdline};
use crate::error::PlatformError;
use crate::platform_trait::PlatformConfigurator;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Bare-metal platform
#[derive(Debug, Clone)]
pub struct MetalPlatform {
    client: Client,
    config_url: Option<String>,
}

impl MetalPlatform {
    /// Platform name.
    pub const NAME: &'static str = "metal";

    /// Create the platform from the kernel command line.
    pub fn new(cmdline: &Cmdline) -> Result<Self, PlatformError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            config_url: cmdline.get(CONFIG_PARAM).map(str::to_string),
        })
    }

    fn target(&self) -> Result<Url, PlatformError> {
        let raw = match self.config_url.as_deref() {
            None | Some("") | Some("none") => return Err(PlatformError::NoConfigSource),
            Some(raw) => raw,
        };

        let url = Url::parse(raw).map_err(|e| PlatformError::InvalidUrl(format!("{}: {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(PlatformError::InvalidUrl(format!("{}: unsupported scheme {:?}", raw, other))),
        }
    }
}

#[async_trait::async_trait]
impl PlatformConfigurator for MetalPlatform {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn configuration(&self) -> Result<Vec<u8>, PlatformError> {
        let url = self.target()?;
        info!("Fetching machine config from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        debug!("Downloaded {} bytes of machine config", body.len());
        Ok(body.to_vec())
    }
}

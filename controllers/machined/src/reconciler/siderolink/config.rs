//! Where the management API lives.
//!
//! The `SideroLinkConfig` document wins; without one, `siderolink.api` on
//! the kernel command line is used. With neither, the output is destroyed.

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::reconciler::active_config;
use crate::runtime::{Input, Reconcile};
use machineconfig::types::siderolink::JOIN_TOKEN_PARAM;
use platform::Cmdline;
use resources::State;
use resources::config::MachineConfig;
use resources::runtime::{KERNEL_CMDLINE_ID, KernelCmdline};
use resources::siderolink::{ID, SiderolinkConfig};
use url::Url;

/// Owner of the siderolink configuration.
pub const SIDEROLINK_CONFIG_OWNER: &str = "siderolink.ConfigController";

/// Query parameter switching WireGuard onto the API connection.
pub const GRPC_TUNNEL_PARAM: &str = "grpc_tunnel";

/// Projects an API URL into the siderolink configuration.
pub fn from_api_url(api_url: &str) -> Result<SiderolinkConfig, ControllerError> {
    let mut url = Url::parse(api_url)
        .map_err(|e| ControllerError::InvalidConfig(format!("siderolink API URL {:?}: {}", api_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ControllerError::InvalidConfig(format!("siderolink API URL {:?} has no host", api_url)))?
        .to_string();

    let mut join_token = None;
    let mut tunnel = false;
    let mut kept = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            JOIN_TOKEN_PARAM => join_token = Some(value.into_owned()),
            GRPC_TUNNEL_PARAM => {
                tunnel = value == "true";
                kept.push((key.into_owned(), value.into_owned()));
            }
            _ => kept.push((key.into_owned(), value.into_owned())),
        }
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    Ok(SiderolinkConfig {
        api_endpoint: url.to_string(),
        host,
        join_token,
        insecure: url.scheme() == "http",
        tunnel,
    })
}

/// Produces `SiderolinkConfig` from the configuration or the command line.
#[derive(Debug, Default)]
pub struct SiderolinkConfigController;

#[async_trait::async_trait]
impl Reconcile for SiderolinkConfigController {
    fn name(&self) -> &'static str {
        SIDEROLINK_CONFIG_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<MachineConfig>(), Input::of::<KernelCmdline>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, SIDEROLINK_CONFIG_OWNER);

        let from_document = active_config(state)?.and_then(|config| config.siderolink().map(|doc| doc.api_url.clone()));
        let api_url = match from_document {
            Some(url) => Some(url),
            None => state
                .try_get::<KernelCmdline>(KERNEL_CMDLINE_ID)?
                .and_then(|cmdline| Cmdline::parse(&cmdline.spec.cmdline).siderolink_api().map(str::to_string)),
        };

        if let Some(api_url) = api_url.filter(|url| !url.is_empty()) {
            outputs.modify(ID, from_api_url(&api_url)?)?;
        }

        outputs.cleanup::<SiderolinkConfig>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SIDEROLINK_ONLY_CONFIG;
    use machineconfig::loader;
    use resources::config::V1ALPHA1_ID;

    #[test]
    fn test_from_api_url() {
        let config = from_api_url("https://siderolink.api/?jointoken=secret&user=alice").unwrap();
        assert_eq!(config.api_endpoint, "https://siderolink.api/?user=alice");
        assert_eq!(config.host, "siderolink.api");
        assert_eq!(config.join_token.as_deref(), Some("secret"));
        assert!(!config.insecure);
        assert!(!config.tunnel);

        let config = from_api_url("http://10.5.0.1:8081?jointoken=x&grpc_tunnel=true").unwrap();
        assert_eq!(config.api_endpoint, "http://10.5.0.1:8081/?grpc_tunnel=true");
        assert!(config.insecure);
        assert!(config.tunnel);

        let config = from_api_url("grpc://siderolink.api:8090").unwrap();
        assert_eq!(config.api_endpoint, "grpc://siderolink.api:8090");
        assert_eq!(config.join_token, None);

        assert!(from_api_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_document_then_cmdline() {
        let state = State::new();
        state
            .create(
                "runtime.KernelCmdlineController",
                KERNEL_CMDLINE_ID,
                KernelCmdline {
                    cmdline: "console=ttyS0 siderolink.api=https://cmdline.api/?jointoken=c".to_string(),
                },
            )
            .unwrap();
        let mut controller = SiderolinkConfigController;

        controller.reconcile(&state).await.unwrap();
        assert_eq!(state.get::<SiderolinkConfig>(ID).unwrap().spec.host, "cmdline.api");

        let document = loader::load_from_bytes(SIDEROLINK_ONLY_CONFIG).unwrap();
        state
            .create("config.Setter", V1ALPHA1_ID, MachineConfig::new(document))
            .unwrap();
        controller.reconcile(&state).await.unwrap();
        let config = state.get::<SiderolinkConfig>(ID).unwrap().spec;
        assert_eq!(config.host, "siderolink.api");
        assert_eq!(config.join_token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_destroyed_without_source() {
        let state = State::new();
        state
            .create(SIDEROLINK_CONFIG_OWNER, ID, from_api_url("https://siderolink.api").unwrap())
            .unwrap();

        SiderolinkConfigController.reconcile(&state).await.unwrap();
        assert!(state.try_get::<SiderolinkConfig>(ID).unwrap().is_none());
    }
}

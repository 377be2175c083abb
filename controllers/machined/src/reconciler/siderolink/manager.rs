//! Provisioning of the management link.
//!
//! Once the node has an address, it registers its WireGuard public key with
//! the management API and turns the answer into a wireguard `LinkSpec` and
//! the `AddressSpec` of the assigned node prefix. In tunnel mode WireGuard
//! runs in userspace, so a `SiderolinkTunnel` is published as well.

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::runtime::{Input, Reconcile};
use crate::wireguard::{generate_private_key, public_key, validate_key};
use machineconfig::constants::{SIDEROLINK_LINK_NAME, SIDEROLINK_MTU, WIREGUARD_PERSISTENT_KEEPALIVE};
use machineconfig::net::Prefix;
use resources::State;
use resources::network::{
    AddressSpec, ConfigLayer, Family, LinkKind, LinkSpec, NetworkStatus, STATUS_ID, Scope, WireguardPeer,
    WireguardSpec,
};
use resources::runtime::{SYSTEM_INFORMATION_ID, SystemInformation, UNIQUE_TOKEN_ID, UniqueMachineToken};
use resources::siderolink::{ID, SiderolinkConfig, SiderolinkTunnel};
use siderolink_client::{ProvisionClient, ProvisionError, ProvisionRequest, ProvisionResponse, SiderolinkClient};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Owner of the link, address and tunnel specs.
pub const SIDEROLINK_MANAGER_OWNER: &str = "siderolink.ManagerController";

/// Builds a provisioning client for a siderolink configuration.
pub type ClientFactory =
    Arc<dyn Fn(&SiderolinkConfig) -> Result<Arc<dyn ProvisionClient>, ProvisionError> + Send + Sync>;

/// Factory building HTTP clients.
pub fn http_client_factory() -> ClientFactory {
    Arc::new(|config: &SiderolinkConfig| {
        let client = SiderolinkClient::new(&config.api_endpoint, config.insecure)?;
        Ok(Arc::new(client) as Arc<dyn ProvisionClient>)
    })
}

/// Registers the node with the management API and configures the link.
pub struct SiderolinkManager {
    factory: ClientFactory,
    private_key: Option<String>,
    provisioned: Option<(ProvisionRequest, ProvisionResponse)>,
}

impl std::fmt::Debug for SiderolinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiderolinkManager")
            .field("provisioned", &self.provisioned.as_ref().map(|(_, response)| response))
            .finish()
    }
}

async fn resolve(endpoint: &str) -> Result<SocketAddr, ControllerError> {
    tokio::net::lookup_host(endpoint)
        .await?
        .next()
        .ok_or_else(|| ControllerError::Reconciliation(format!("endpoint {} did not resolve", endpoint)))
}

fn invalid(what: &str, value: &str, e: impl std::fmt::Display) -> ControllerError {
    ControllerError::Reconciliation(format!("provision response has invalid {} {:?}: {}", what, value, e))
}

/// The link and address specs for a provision response.
pub async fn link_specs(
    private_key: &str,
    response: &ProvisionResponse,
    tunnel: bool,
) -> Result<(LinkSpec, AddressSpec), ControllerError> {
    validate_key(&response.server_public_key)?;
    let node_prefix: Prefix = response
        .node_address_prefix
        .parse()
        .map_err(|e| invalid("node prefix", &response.node_address_prefix, e))?;
    let server_address: IpAddr = response
        .server_address
        .parse()
        .map_err(|e| invalid("server address", &response.server_address, e))?;

    // Over the tunnel WireGuard talks to the local end of the relay.
    let peer_endpoint = match (&response.grpc_peer_addr_port, tunnel) {
        (Some(relay), true) => resolve(relay).await?,
        _ => resolve(&response.server_endpoint).await?,
    };

    let link = LinkSpec {
        name: SIDEROLINK_LINK_NAME.to_string(),
        logical: true,
        up: true,
        mtu: SIDEROLINK_MTU,
        kind: LinkKind::Wireguard,
        wireguard: Some(WireguardSpec {
            private_key: private_key.to_string(),
            listen_port: 0,
            firewall_mark: 0,
            peers: vec![WireguardPeer {
                public_key: response.server_public_key.clone(),
                endpoint: Some(peer_endpoint),
                persistent_keepalive_interval: Some(WIREGUARD_PERSISTENT_KEEPALIVE),
                allowed_ips: vec![Prefix::host(server_address)],
            }],
        }),
        config_layer: ConfigLayer::Operator,
    };

    let address = AddressSpec {
        address: Some(node_prefix),
        link_name: SIDEROLINK_LINK_NAME.to_string(),
        family: Family::of(node_prefix.addr()),
        scope: Scope::Global,
        config_layer: ConfigLayer::Operator,
    };

    Ok((link, address))
}

impl SiderolinkManager {
    /// Manager building provisioning clients with `factory`.
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            private_key: None,
            provisioned: None,
        }
    }

    async fn provision(
        &mut self,
        config: &SiderolinkConfig,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse, ControllerError> {
        if let Some((previous, response)) = &self.provisioned {
            if *previous == request {
                return Ok(response.clone());
            }
        }

        let client = (self.factory)(config)?;
        info!("Provisioning node {} with {}", request.node_uuid, config.api_endpoint);
        let response = client.provision(request.clone()).await?;
        debug!("Assigned {} on siderolink", response.node_address_prefix);

        self.provisioned = Some((request, response.clone()));
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Reconcile for SiderolinkManager {
    fn name(&self) -> &'static str {
        SIDEROLINK_MANAGER_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::of::<SiderolinkConfig>(),
            Input::of::<NetworkStatus>(),
            Input::of::<SystemInformation>(),
            Input::of::<UniqueMachineToken>(),
        ]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, SIDEROLINK_MANAGER_OWNER);

        let Some(config) = state.try_get::<SiderolinkConfig>(ID)?.map(|r| r.spec) else {
            self.provisioned = None;
            outputs.cleanup::<LinkSpec>()?;
            outputs.cleanup::<AddressSpec>()?;
            return outputs.cleanup::<SiderolinkTunnel>();
        };

        let address_ready = state
            .try_get::<NetworkStatus>(STATUS_ID)?
            .is_some_and(|status| status.spec.address_ready);
        let Some(system) = state.try_get::<SystemInformation>(SYSTEM_INFORMATION_ID)? else {
            debug!("Waiting for system information");
            return Ok(());
        };
        if !address_ready {
            debug!("Waiting for the node address before provisioning");
            return Ok(());
        }

        let unique_token = state
            .try_get::<UniqueMachineToken>(UNIQUE_TOKEN_ID)?
            .map(|r| r.spec.token)
            .filter(|token| !token.is_empty());
        let private_key = self.private_key.get_or_insert_with(generate_private_key).clone();

        let request = ProvisionRequest {
            node_uuid: system.spec.uuid.clone(),
            node_public_key: public_key(&private_key)?,
            join_token: config.join_token.clone(),
            node_unique_token: unique_token,
            wireguard_over_grpc: config.tunnel.then_some(true),
        };
        let response = self.provision(&config, request).await?;
        let (link, address) = link_specs(&private_key, &response, config.tunnel).await?;

        if config.tunnel {
            let server_address: IpAddr = response
                .server_address
                .parse()
                .map_err(|e| invalid("server address", &response.server_address, e))?;
            outputs.modify(
                ID,
                SiderolinkTunnel {
                    api_endpoint: config.api_endpoint.clone(),
                    link_name: SIDEROLINK_LINK_NAME.to_string(),
                    our_address: address.address,
                    peer_address: Some(server_address),
                    relay_address: link
                        .wireguard
                        .as_ref()
                        .and_then(|wireguard| wireguard.peers.first())
                        .and_then(|peer| peer.endpoint),
                    mtu: SIDEROLINK_MTU,
                },
            )?;
        }

        if let Some(prefix) = &address.address {
            outputs.modify(&AddressSpec::id(SIDEROLINK_LINK_NAME, prefix), address.clone())?;
        }
        outputs.modify(SIDEROLINK_LINK_NAME, link)?;

        outputs.cleanup::<LinkSpec>()?;
        outputs.cleanup::<AddressSpec>()?;
        outputs.cleanup::<SiderolinkTunnel>()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;

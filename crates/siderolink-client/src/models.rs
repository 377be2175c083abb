//! Provisioning API wire types

use serde::{Deserialize, Serialize};

/// Request registering a node and its WireGuard public key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisionRequest {
    /// Hardware UUID of the node
    pub node_uuid: String,
    /// WireGuard public key of the node (base64)
    pub node_public_key: String,
    /// Join token from the API URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_token: Option<String>,
    /// Token distinguishing nodes sharing a UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_unique_token: Option<String>,
    /// Ask the server to relay WireGuard over the API connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_over_grpc: Option<bool>,
}

/// Parameters of the WireGuard link assigned to the node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisionResponse {
    /// `host:port` of the server WireGuard endpoint
    pub server_endpoint: String,
    /// Server WireGuard public key (base64)
    pub server_public_key: String,
    /// Address assigned to the node, with prefix length
    pub node_address_prefix: String,
    /// Server address on the link
    pub server_address: String,
    /// Address of the relay when WireGuard runs over the API connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_peer_addr_port: Option<String>,
}

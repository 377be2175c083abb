//! Out-of-band management resources (`siderolink` namespace).

use crate::resource::ResourceSpec;
use machineconfig::net::Prefix;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Namespace of siderolink resources.
pub const NAMESPACE: &str = "siderolink";

/// ID of every siderolink singleton.
pub const ID: &str = "siderolink";

/// Where and how to reach the management API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiderolinkConfig {
    /// API URL with the join token redacted
    pub api_endpoint: String,
    /// Bare host of the API URL
    pub host: String,
    /// Join token
    pub join_token: Option<String>,
    /// Reach the API without TLS
    pub insecure: bool,
    /// Relay WireGuard over the API connection instead of UDP
    pub tunnel: bool,
}

impl ResourceSpec for SiderolinkConfig {
    const TYPE: &'static str = "SiderolinkConfigs.siderolink.talos.dev";
    const NAMESPACE: &'static str = "config";
}

/// Health of the management link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiderolinkStatus {
    /// Bare host of the API
    pub host: String,
    /// Whether the peer completed a recent handshake
    pub connected: bool,
}

impl ResourceSpec for SiderolinkStatus {
    const TYPE: &'static str = "SiderolinkStatuses.siderolink.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// Parameters of a WireGuard-over-gRPC tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiderolinkTunnel {
    /// API URL the relay connects to
    pub api_endpoint: String,
    /// Name of the userspace link
    pub link_name: String,
    /// Address of the node on the link
    pub our_address: Option<Prefix>,
    /// Address of the server on the link
    pub peer_address: Option<IpAddr>,
    /// Local UDP address the relay listens on for the device
    pub relay_address: Option<SocketAddr>,
    /// Link MTU
    pub mtu: u32,
}

impl ResourceSpec for SiderolinkTunnel {
    const TYPE: &'static str = "SiderolinkTunnels.siderolink.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

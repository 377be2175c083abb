//! Network resources (`network` namespace).
//!
//! Only the subset the configuration subsystem reads or writes: node
//! addresses and their filters, link and address specs, and network status.

use crate::resource::ResourceSpec;
use machineconfig::net::Prefix;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Namespace of network resources.
pub const NAMESPACE: &str = "network";

/// Namespace of specs consumed by the network data plane.
pub const CONFIG_NAMESPACE: &str = "network-config";

/// Addresses currently assigned to the node.
pub const NODE_ADDRESS_CURRENT_ID: &str = "current";

/// Addresses the node routes traffic from.
pub const NODE_ADDRESS_ROUTED_ID: &str = "routed";

/// Filter excluding Kubernetes pod and service CIDRs.
pub const FILTER_NO_K8S: &str = "no-k8s";

/// Filter keeping only Kubernetes pod and service CIDRs.
pub const FILTER_ONLY_K8S: &str = "only-k8s";

/// ID of a node address list with a filter applied.
pub fn filtered_node_address_id(base: &str, filter: &str) -> String {
    format!("{}-{}", base, filter)
}

/// List of node addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Addresses with their prefix length
    pub addresses: Vec<Prefix>,
}

impl ResourceSpec for NodeAddress {
    const TYPE: &'static str = "NodeAddresses.net.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// Filter applied to node address lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAddressFilter {
    /// Keep only addresses inside these subnets
    pub include_subnets: Vec<Prefix>,
    /// Drop addresses inside these subnets
    pub exclude_subnets: Vec<Prefix>,
}

impl NodeAddressFilter {
    /// Whether `addr` passes the filter.
    pub fn matches(&self, addr: &Prefix) -> bool {
        let ip = addr.addr();
        if !self.include_subnets.is_empty() && !self.include_subnets.iter().any(|s| s.contains(ip)) {
            return false;
        }
        !self.exclude_subnets.iter().any(|s| s.contains(ip))
    }
}

impl ResourceSpec for NodeAddressFilter {
    const TYPE: &'static str = "NodeAddressFilters.net.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// ID of the network status singleton.
pub const STATUS_ID: &str = "status";

/// Readiness of the node network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// At least one routable address is assigned
    pub address_ready: bool,
    /// External connectivity is established
    pub connectivity_ready: bool,
}

impl ResourceSpec for NetworkStatus {
    const TYPE: &'static str = "NetworkStatuses.net.talos.dev";
    const NAMESPACE: &'static str = NAMESPACE;
}

/// Link kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Physical link
    #[default]
    Physical,
    /// WireGuard tunnel
    Wireguard,
}

impl LinkKind {
    /// Kernel name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Physical => "",
            LinkKind::Wireguard => "wireguard",
        }
    }
}

/// WireGuard peer of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardPeer {
    /// Peer public key (base64)
    pub public_key: String,
    /// Peer endpoint
    pub endpoint: Option<SocketAddr>,
    /// Keepalive interval
    pub persistent_keepalive_interval: Option<Duration>,
    /// Routed prefixes
    pub allowed_ips: Vec<Prefix>,
}

/// WireGuard settings of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireguardSpec {
    /// Private key (base64)
    pub private_key: String,
    /// Listen port, 0 for random
    pub listen_port: u16,
    /// Firewall mark
    pub firewall_mark: u32,
    /// Peers
    pub peers: Vec<WireguardPeer>,
}

/// Desired state of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    /// Link name
    pub name: String,
    /// Whether the link is logical (created by the node)
    pub logical: bool,
    /// Bring the link up
    pub up: bool,
    /// MTU
    pub mtu: u32,
    /// Link kind
    pub kind: LinkKind,
    /// WireGuard settings for wireguard links
    pub wireguard: Option<WireguardSpec>,
    /// Layer of the configuration
    pub config_layer: ConfigLayer,
}

impl ResourceSpec for LinkSpec {
    const TYPE: &'static str = "LinkSpecs.net.talos.dev";
    const NAMESPACE: &'static str = CONFIG_NAMESPACE;
}

/// Address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// IPv4
    #[default]
    Inet4,
    /// IPv6
    Inet6,
}

impl Family {
    /// Family of `addr`.
    pub fn of(addr: IpAddr) -> Self {
        if addr.is_ipv4() {
            Family::Inet4
        } else {
            Family::Inet6
        }
    }
}

/// Address scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Global scope
    #[default]
    Global,
    /// Link-local scope
    Link,
    /// Host scope
    Host,
}

/// Layer a spec was produced by; higher layers win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    /// Built-in defaults
    #[default]
    Default,
    /// Command line
    Cmdline,
    /// Platform
    Platform,
    /// Operator
    Operator,
    /// Machine configuration
    Configuration,
}

/// Desired address on a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpec {
    /// Address with prefix length
    pub address: Option<Prefix>,
    /// Link the address is assigned to
    pub link_name: String,
    /// Address family
    pub family: Family,
    /// Address scope
    pub scope: Scope,
    /// Layer of the configuration
    pub config_layer: ConfigLayer,
}

impl AddressSpec {
    /// ID of the address spec for `address` on `link`.
    pub fn id(link: &str, address: &Prefix) -> String {
        format!("{}/{}", link, address)
    }
}

impl ResourceSpec for AddressSpec {
    const TYPE: &'static str = "AddressSpecs.net.talos.dev";
    const NAMESPACE: &'static str = CONFIG_NAMESPACE;
}

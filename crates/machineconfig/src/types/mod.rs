//! Registered document kinds.
//!
//! Organised by area:
//! - `v1alpha1`: the legacy monolithic machine + cluster document
//! - `network`: links, addressing, name resolution, firewall, probes
//! - `cri`: container registry mirrors, credentials, and TLS
//! - `security`: trusted roots and image verification
//! - `hardware`: PCI driver rebinding
//! - `siderolink`: out-of-band management access
//! - `patch`: patch-delete tombstones
//! - `unknown`: placeholder for unregistered kinds

pub mod cri;
pub mod hardware;
pub mod network;
pub mod patch;
pub mod security;
pub mod siderolink;
pub mod unknown;
pub mod v1alpha1;

/// Scheme version of every new-style document.
pub const API_VERSION: &str = "v1alpha1";

/// Kind names of every registered document.
pub mod kinds {
    pub const V1ALPHA1: &str = "v1alpha1";
    pub const LINK: &str = "LinkConfig";
    pub const BOND: &str = "BondConfig";
    pub const BRIDGE: &str = "BridgeConfig";
    pub const DUMMY_LINK: &str = "DummyLinkConfig";
    pub const VLAN: &str = "VLANConfig";
    pub const VRF: &str = "VRFConfig";
    pub const WIREGUARD: &str = "WireguardConfig";
    pub const DHCPV4: &str = "DHCPv4Config";
    pub const DHCPV6: &str = "DHCPv6Config";
    pub const HOSTNAME: &str = "HostnameConfig";
    pub const RESOLVER: &str = "ResolverConfig";
    pub const TIME_SYNC: &str = "TimeSyncConfig";
    pub const KUBESPAN: &str = "KubeSpanConfig";
    pub const KUBESPAN_ENDPOINTS: &str = "KubespanEndpointsConfig";
    pub const RULE: &str = "NetworkRuleConfig";
    pub const STATIC_HOST: &str = "StaticHostConfig";
    pub const TCP_PROBE: &str = "TCPProbeConfig";
    pub const LAYER2_VIP: &str = "Layer2VIPConfig";
    pub const HCLOUD_VIP: &str = "HCloudVIPConfig";
    pub const BLACKHOLE_ROUTE: &str = "BlackholeRouteConfig";
    pub const LINK_ALIAS: &str = "LinkAliasConfig";
    pub const ETHERNET: &str = "EthernetConfig";
    pub const REGISTRY_MIRROR: &str = "RegistryMirrorConfig";
    pub const REGISTRY_AUTH: &str = "RegistryAuthConfig";
    pub const REGISTRY_TLS: &str = "RegistryTLSConfig";
    pub const TRUSTED_ROOTS: &str = "TrustedRootsConfig";
    pub const IMAGE_VERIFICATION: &str = "ImageVerificationConfig";
    pub const PCI_DRIVER_REBIND: &str = "PCIDriverRebindConfig";
    pub const SIDEROLINK: &str = "SideroLinkConfig";
}

pub(crate) fn api_version() -> String {
    API_VERSION.to_string()
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

/// Validates that a required name is set.
pub(crate) fn require_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        Err("name must be specified".to_string())
    } else {
        Ok(())
    }
}

/// Parses a Go-style duration string ("1s", "1m30s").
pub(crate) fn parse_duration(value: &str) -> Result<std::time::Duration, String> {
    humantime::parse_duration(value).map_err(|e| format!("invalid duration {:?}: {}", value, e))
}

/// Example of every registered kind, in registry order.
pub fn examples() -> Vec<Box<dyn crate::document::Document>> {
    use crate::document::DocumentSpec;
    use cri::{RegistryAuthConfig, RegistryMirrorConfig, RegistryTlsConfig};
    use network::*;

    vec![
        Box::new(v1alpha1::Config::example()),
        Box::new(LinkConfig::example()),
        Box::new(BondConfig::example()),
        Box::new(BridgeConfig::example()),
        Box::new(DummyLinkConfig::example()),
        Box::new(VlanConfig::example()),
        Box::new(VrfConfig::example()),
        Box::new(WireguardConfig::example()),
        Box::new(Dhcpv4Config::example()),
        Box::new(Dhcpv6Config::example()),
        Box::new(HostnameConfig::example()),
        Box::new(ResolverConfig::example()),
        Box::new(TimeSyncConfig::example()),
        Box::new(KubeSpanConfig::example()),
        Box::new(KubespanEndpointsConfig::example()),
        Box::new(NetworkRuleConfig::example()),
        Box::new(StaticHostConfig::example()),
        Box::new(TcpProbeConfig::example()),
        Box::new(Layer2VipConfig::example()),
        Box::new(HcloudVipConfig::example()),
        Box::new(BlackholeRouteConfig::example()),
        Box::new(LinkAliasConfig::example()),
        Box::new(EthernetConfig::example()),
        Box::new(RegistryMirrorConfig::example()),
        Box::new(RegistryAuthConfig::example()),
        Box::new(RegistryTlsConfig::example()),
        Box::new(security::TrustedRootsConfig::example()),
        Box::new(security::ImageVerificationConfig::example()),
        Box::new(hardware::PciDriverRebindConfig::example()),
        Box::new(siderolink::SideroLinkConfig::example()),
    ]
}

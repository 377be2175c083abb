//! Network document kinds.

pub mod alias;
pub mod bond;
pub mod dhcp;
pub mod ethernet;
pub mod hostname;
pub mod kubespan;
pub mod link;
pub mod probe;
pub mod resolver;
pub mod rule;
pub mod static_host;
pub mod vip;
pub mod vlan;
pub mod wireguard;

pub use alias::{BlackholeRouteConfig, LinkAliasConfig};
pub use bond::{BondConfig, BridgeConfig};
pub use dhcp::{Dhcpv4Config, Dhcpv6Config};
pub use ethernet::EthernetConfig;
pub use hostname::HostnameConfig;
pub use kubespan::{KubeSpanConfig, KubespanEndpointsConfig};
pub use link::{DummyLinkConfig, LinkConfig};
pub use probe::TcpProbeConfig;
pub use resolver::{ResolverConfig, TimeSyncConfig};
pub use rule::NetworkRuleConfig;
pub use static_host::StaticHostConfig;
pub use vip::{HcloudVipConfig, Layer2VipConfig};
pub use vlan::{VlanConfig, VrfConfig};
pub use wireguard::WireguardConfig;

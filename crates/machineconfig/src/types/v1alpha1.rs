//! Legacy monolithic machine configuration (`version: v1alpha1`).
//!
//! This document carries no `kind` key; the loader routes any document
//! without one here. It holds the `machine` and `cluster` sections that
//! Kubernetes control-plane projections are derived from.

use crate::constants;
use crate::document::{DocumentSpec, DocumentVisitor, FieldValue, ValidationMode, ValidationReport};
use crate::net::Prefix;
use crate::types::{is_false, kinds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Role of the machine in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineType {
    /// Not configured yet
    #[default]
    Unknown,
    /// First control-plane node bootstrapping etcd
    Init,
    /// Control-plane node
    #[serde(rename = "controlplane")]
    ControlPlane,
    /// Worker node
    Worker,
}

impl MachineType {
    /// Whether the node runs control-plane components.
    pub fn is_control_plane(&self) -> bool {
        matches!(self, MachineType::Init | MachineType::ControlPlane)
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineType::Unknown => "unknown",
            MachineType::Init => "init",
            MachineType::ControlPlane => "controlplane",
            MachineType::Worker => "worker",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MachineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "unknown" => Ok(MachineType::Unknown),
            "init" => Ok(MachineType::Init),
            "controlplane" => Ok(MachineType::ControlPlane),
            "worker" | "join" => Ok(MachineType::Worker),
            other => Err(format!("unknown machine type {:?}", other)),
        }
    }
}

/// Root of the legacy document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Always `v1alpha1`
    #[serde(default)]
    pub version: String,

    /// Enable verbose logging to the console
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    /// Keep the config on disk across reboots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,

    /// Node-specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<MachineConfig>,

    /// Cluster-wide settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterConfig>,
}

/// Machine section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Machine role (`init`, `controlplane`, `worker`)
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub machine_type: String,

    /// Token used to join the machine to the cluster
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    /// Machine-level certificate authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<PemEncodedKeyPair>,

    /// Extra SANs for the machine API certificate
    #[serde(default, rename = "certSANs", skip_serializing_if = "Vec::is_empty")]
    pub cert_sans: Vec<String>,

    /// Kubelet settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfig>,

    /// Network settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    /// Installation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallConfig>,

    /// Time synchronization settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeConfig>,

    /// Image registry settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registries: Option<RegistriesConfig>,

    /// Feature flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesConfig>,
}

/// PEM-encoded certificate and key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PemEncodedKeyPair {
    /// Certificate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crt: String,

    /// Private key (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

/// Kubelet section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    /// Kubelet image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,

    /// Skip registering the node with the API server
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip_node_registration: bool,

    /// Subnets the kubelet picks the node IP from
    #[serde(default, rename = "nodeIP", skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<KubeletNodeIpConfig>,
}

/// Node IP selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletNodeIpConfig {
    /// Subnets (with optional `!` negation)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_subnets: Vec<String>,
}

/// Machine network section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Static hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Per-interface configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<DeviceConfig>,

    /// DNS servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    /// KubeSpan settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubespan: Option<KubeSpanLegacyConfig>,
}

/// Interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Interface name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,

    /// Static addresses in CIDR notation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    /// Run DHCP on the interface
    #[serde(default, skip_serializing_if = "is_false")]
    pub dhcp: bool,

    /// Interface MTU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// Legacy KubeSpan toggle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KubeSpanLegacyConfig {
    /// Enable KubeSpan
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,
}

/// Installation section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    /// Target disk
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disk: String,

    /// Installer image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Wipe the disk before installing
    #[serde(default, skip_serializing_if = "is_false")]
    pub wipe: bool,
}

/// Legacy time section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeConfig {
    /// Disable time synchronization
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    /// NTP servers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,
}

/// Registry section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistriesConfig {
    /// Mirrors keyed by registry host
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mirrors: BTreeMap<String, RegistryMirror>,

    /// Per-registry auth/TLS keyed by registry host
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, RegistryConfig>,
}

/// Legacy registry mirror.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryMirror {
    /// Mirror endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

/// Legacy per-registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<RegistryAuth>,
}

/// Legacy registry credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAuth {
    /// Username
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Password (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Base64 `user:password` (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
    /// Identity token (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identity_token: String,
}

/// Feature flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesConfig {
    /// Derive a stable hostname from the machine identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_hostname: Option<bool>,

    /// Access to the machine API from inside Kubernetes
    #[serde(default, rename = "kubernetesTalosAPIAccess", skip_serializing_if = "Option::is_none")]
    pub kubernetes_api_access: Option<KubernetesApiAccessConfig>,
}

/// Machine API access from Kubernetes workloads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApiAccessConfig {
    /// Enable the feature
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Roles that service accounts may request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_roles: Vec<String>,

    /// Namespaces allowed to request access
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_kubernetes_namespaces: Vec<String>,
}

/// Cluster section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Cluster identity
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Shared secret (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,

    /// Control-plane endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneConfig>,

    /// Cluster name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,

    /// Pod/service networking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<ClusterNetworkConfig>,

    /// Bootstrap token (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    /// Secretbox encryption key (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secretbox_encryption_secret: String,

    /// Kubernetes CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<PemEncodedKeyPair>,

    /// Aggregation layer CA
    #[serde(default, rename = "aggregatorCA", skip_serializing_if = "Option::is_none")]
    pub aggregator_ca: Option<PemEncodedKeyPair>,

    /// Service account signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountKey>,

    /// API server settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<ApiServerConfig>,

    /// Controller manager settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_manager: Option<ControllerManagerConfig>,

    /// Scheduler settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerConfig>,

    /// kube-proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,

    /// CoreDNS settings
    #[serde(default, rename = "coreDNS", skip_serializing_if = "Option::is_none")]
    pub core_dns: Option<CoreDnsConfig>,

    /// External cloud provider settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_cloud_provider: Option<ExternalCloudProviderConfig>,

    /// Manifests fetched by URL
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_manifests: Vec<String>,

    /// Headers for fetching extra manifests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_manifest_headers: BTreeMap<String, String>,

    /// Manifests embedded in the config
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_manifests: Vec<InlineManifest>,

    /// Allow workloads on control-plane nodes
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_scheduling_on_control_planes: bool,
}

/// Control-plane endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Canonical API server URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    /// Port the local API server listens on
    #[serde(default, rename = "localAPIServerPort", skip_serializing_if = "Option::is_none")]
    pub local_api_server_port: Option<u16>,
}

/// Cluster networking.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkConfig {
    /// CNI selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<CniConfig>,

    /// Cluster DNS domain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_domain: String,

    /// Pod CIDRs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_subnets: Vec<String>,

    /// Service CIDRs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_subnets: Vec<String>,
}

/// CNI selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CniConfig {
    /// `flannel`, `custom`, or `none`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Service account key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    /// PEM private key (secret)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

/// API server settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,

    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Extra certificate SANs
    #[serde(default, rename = "certSANs", skip_serializing_if = "Vec::is_empty")]
    pub cert_sans: Vec<String>,

    /// Disable the pod security policy admission
    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_pod_security_policy: bool,

    /// Admission plugin configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admission_control: Vec<AdmissionPluginConfig>,

    /// Audit policy document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_policy: Option<serde_yaml::Value>,
}

/// Admission plugin configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdmissionPluginConfig {
    /// Plugin name
    pub name: String,
    /// Free-form plugin configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_yaml::Value>,
}

/// Controller manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerManagerConfig {
    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,

    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,

    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Scheduler configuration document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_yaml::Value>,
}

/// kube-proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Do not deploy kube-proxy
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Proxy mode (`iptables`, `ipvs`, `nftables`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,

    /// Extra command-line arguments
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

/// CoreDNS settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreDnsConfig {
    /// Do not deploy CoreDNS
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,

    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

/// External cloud provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalCloudProviderConfig {
    /// Enable the external cloud provider
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Manifests to deploy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<String>,
}

/// Manifest embedded in the config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InlineManifest {
    /// Manifest name
    pub name: String,
    /// Manifest body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contents: String,
}

impl Config {
    /// Machine role, `Unknown` when unset or unparsable.
    pub fn machine_type(&self) -> MachineType {
        self.machine
            .as_ref()
            .and_then(|m| m.machine_type.parse().ok())
            .unwrap_or_default()
    }

    /// Cluster name, if set.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster
            .as_ref()
            .map(|c| c.cluster_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Control-plane endpoint, if set.
    pub fn control_plane_endpoint(&self) -> Option<&str> {
        self.cluster
            .as_ref()
            .and_then(|c| c.control_plane.as_ref())
            .map(|cp| cp.endpoint.as_str())
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// Port of the local API server.
    pub fn local_api_server_port(&self) -> u16 {
        self.cluster
            .as_ref()
            .and_then(|c| c.control_plane.as_ref())
            .and_then(|cp| cp.local_api_server_port)
            .unwrap_or(constants::DEFAULT_API_SERVER_PORT)
    }

    /// Pod CIDRs, defaulted when unset.
    pub fn pod_cidrs(&self) -> Vec<String> {
        self.cluster
            .as_ref()
            .and_then(|c| c.network.as_ref())
            .map(|n| n.pod_subnets.clone())
            .filter(|subnets| !subnets.is_empty())
            .unwrap_or_else(|| vec![constants::DEFAULT_POD_SUBNET.to_string()])
    }

    /// Service CIDRs, defaulted when unset.
    pub fn service_cidrs(&self) -> Vec<String> {
        self.cluster
            .as_ref()
            .and_then(|c| c.network.as_ref())
            .map(|n| n.service_subnets.clone())
            .filter(|subnets| !subnets.is_empty())
            .unwrap_or_else(|| vec![constants::DEFAULT_SERVICE_SUBNET.to_string()])
    }

    /// Cluster DNS domain, defaulted when unset.
    pub fn dns_domain(&self) -> String {
        self.cluster
            .as_ref()
            .and_then(|c| c.network.as_ref())
            .map(|n| n.dns_domain.clone())
            .filter(|domain| !domain.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_DNS_DOMAIN.to_string())
    }

    /// CNI name, defaulted to flannel.
    pub fn cni_name(&self) -> String {
        self.cluster
            .as_ref()
            .and_then(|c| c.network.as_ref())
            .and_then(|n| n.cni.as_ref())
            .map(|cni| cni.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| constants::FLANNEL_CNI.to_string())
    }

    /// Whether the kubelet skips node registration.
    pub fn kubelet_skip_node_registration(&self) -> bool {
        self.machine
            .as_ref()
            .and_then(|m| m.kubelet.as_ref())
            .is_some_and(|k| k.skip_node_registration)
    }

    /// Static hostname from the machine network section.
    pub fn static_hostname(&self) -> Option<&str> {
        self.machine
            .as_ref()
            .and_then(|m| m.network.as_ref())
            .and_then(|n| n.hostname.as_deref())
            .filter(|h| !h.is_empty())
    }

    /// Whether the stable hostname feature is on.
    pub fn stable_hostname(&self) -> bool {
        self.machine
            .as_ref()
            .and_then(|m| m.features.as_ref())
            .and_then(|f| f.stable_hostname)
            .unwrap_or(false)
    }

    /// Machine API access from Kubernetes, when enabled.
    pub fn kubernetes_api_access(&self) -> Option<&KubernetesApiAccessConfig> {
        self.machine
            .as_ref()
            .and_then(|m| m.features.as_ref())
            .and_then(|f| f.kubernetes_api_access.as_ref())
            .filter(|access| access.enabled)
    }

    /// Whether the legacy document carries everything needed to boot: the
    /// machine role, the cluster name, and the control-plane endpoint.
    pub fn is_complete_for_boot(&self) -> bool {
        let machine_ok = self
            .machine
            .as_ref()
            .is_some_and(|m| !m.machine_type.is_empty());
        machine_ok && self.cluster_name().is_some() && self.control_plane_endpoint().is_some()
    }
}

fn redact_string(value: &mut String, replacement: &str) {
    if !value.is_empty() {
        *value = replacement.to_string();
    }
}

fn redact_key_pair(pair: &mut Option<PemEncodedKeyPair>, replacement: &str) {
    if let Some(pair) = pair {
        redact_string(&mut pair.key, replacement);
    }
}

fn validate_subnets(report: &mut ValidationReport, field: &str, subnets: &[String]) {
    for subnet in subnets {
        if let Err(e) = subnet.parse::<Prefix>() {
            report.error(format!("cluster.network.{} {:?} is invalid: {}", field, subnet, e));
        }
    }
}

impl DocumentSpec for Config {
    const KIND: &'static str = kinds::V1ALPHA1;
    const DESCRIPTION: &'static str = "Legacy machine and cluster configuration.";

    fn api_version(&self) -> &str {
        ""
    }

    fn example() -> Self {
        Config {
            version: "v1alpha1".to_string(),
            debug: None,
            persist: Some(true),
            machine: Some(MachineConfig {
                machine_type: "controlplane".to_string(),
                token: "abcdef.0123456789abcdef".to_string(),
                install: Some(InstallConfig {
                    disk: "/dev/sda".to_string(),
                    image: "ghcr.io/siderolabs/installer:latest".to_string(),
                    wipe: false,
                }),
                ..MachineConfig::default()
            }),
            cluster: Some(ClusterConfig {
                control_plane: Some(ControlPlaneConfig {
                    endpoint: "https://1.2.3.4:6443".to_string(),
                    local_api_server_port: None,
                }),
                cluster_name: "cluster-X".to_string(),
                network: Some(ClusterNetworkConfig {
                    cni: None,
                    dns_domain: "cluster.local".to_string(),
                    pod_subnets: vec!["10.244.0.0/16".to_string()],
                    service_subnets: vec!["10.96.0.0/12".to_string()],
                }),
                token: "0123456789abcdef".to_string(),
                ..ClusterConfig::default()
            }),
        }
    }

    fn validate(&self, mode: &ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::new();

        if self.version != "v1alpha1" {
            report.error(format!("unsupported config version {:?}", self.version));
        }

        if let Some(machine) = &self.machine {
            if let Err(e) = machine.machine_type.parse::<MachineType>() {
                report.error(format!("machine.type: {}", e));
            }

            if mode.requires_install() && !mode.in_container() {
                let disk_set = machine.install.as_ref().is_some_and(|i| !i.disk.is_empty());
                if !disk_set {
                    report.error("machine.install.disk is required");
                }
            }

            if let Some(network) = &machine.network {
                for device in &network.interfaces {
                    if device.interface.is_empty() {
                        report.error("machine.network.interfaces: interface name is required");
                    }
                    for address in &device.addresses {
                        if let Err(e) = crate::net::validate_address(address) {
                            report.error(format!("machine.network.interfaces[{}]: {}", device.interface, e));
                        }
                    }
                }
                for nameserver in &network.nameservers {
                    if nameserver.parse::<std::net::IpAddr>().is_err() {
                        report.error(format!("machine.network.nameservers: {:?} is not an IP address", nameserver));
                    }
                }
            }
        }

        if let Some(cluster) = &self.cluster {
            if let Some(control_plane) = &cluster.control_plane {
                if let Err(e) = Url::parse(&control_plane.endpoint) {
                    report.error(format!(
                        "cluster.controlPlane.endpoint {:?} is invalid: {}",
                        control_plane.endpoint, e
                    ));
                }
            }
            if let Some(network) = &cluster.network {
                validate_subnets(&mut report, "podSubnets", &network.pod_subnets);
                validate_subnets(&mut report, "serviceSubnets", &network.service_subnets);
            }
            if let Some(proxy) = &cluster.proxy {
                if proxy.extra_args.contains_key("kubeconfig") {
                    report.error("cluster.proxy.extraArgs: \"kubeconfig\" cannot be overridden");
                }
            }
        }

        if self.machine.is_some() && self.cluster.is_none() {
            report.warn("cluster section is missing");
        }

        report
    }

    fn redact(&mut self, replacement: &str) {
        if let Some(machine) = &mut self.machine {
            redact_string(&mut machine.token, replacement);
            redact_key_pair(&mut machine.ca, replacement);
            if let Some(registries) = &mut machine.registries {
                for config in registries.config.values_mut() {
                    if let Some(auth) = &mut config.auth {
                        redact_string(&mut auth.password, replacement);
                        redact_string(&mut auth.auth, replacement);
                        redact_string(&mut auth.identity_token, replacement);
                    }
                }
            }
        }
        if let Some(cluster) = &mut self.cluster {
            redact_string(&mut cluster.secret, replacement);
            redact_string(&mut cluster.token, replacement);
            redact_string(&mut cluster.secretbox_encryption_secret, replacement);
            redact_key_pair(&mut cluster.ca, replacement);
            redact_key_pair(&mut cluster.aggregator_ca, replacement);
            if let Some(sa) = &mut cluster.service_account {
                redact_string(&mut sa.key, replacement);
            }
        }
    }

    fn accept(&self, visitor: &mut dyn DocumentVisitor) {
        visitor.visit("version", FieldValue::Str(Some(&self.version)));
        visitor.visit("machineType", FieldValue::Str(Some(&self.machine_type().to_string())));
        visitor.visit("clusterName", FieldValue::Str(self.cluster_name()));
        visitor.visit("controlPlaneEndpoint", FieldValue::Str(self.control_plane_endpoint()));
        visitor.visit("localAPIServerPort", FieldValue::UInt(Some(u64::from(self.local_api_server_port()))));
        visitor.visit("podCIDRs", FieldValue::List(self.pod_cidrs().len()));
        visitor.visit("serviceCIDRs", FieldValue::List(self.service_cidrs().len()));
        visitor.visit("dnsDomain", FieldValue::Str(Some(&self.dns_domain())));
        visitor.visit("cni", FieldValue::Str(Some(&self.cni_name())));
        visitor.visit("skipNodeRegistration", FieldValue::Bool(Some(self.kubelet_skip_node_registration())));
        visitor.visit("hostname", FieldValue::Str(self.static_hostname()));
        visitor.visit("stableHostname", FieldValue::Bool(Some(self.stable_hostname())));
        visitor.visit("kubernetesAPIAccess", FieldValue::Bool(Some(self.kubernetes_api_access().is_some())));
        visitor.visit("persist", FieldValue::Bool(self.persist));
        visitor.visit("debug", FieldValue::Bool(self.debug));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_type_parse() {
        assert_eq!("controlplane".parse::<MachineType>().unwrap(), MachineType::ControlPlane);
        assert_eq!("init".parse::<MachineType>().unwrap(), MachineType::Init);
        assert_eq!("worker".parse::<MachineType>().unwrap(), MachineType::Worker);
        assert!("master".parse::<MachineType>().is_err());
        assert!(MachineType::Init.is_control_plane());
        assert!(!MachineType::Worker.is_control_plane());
    }

    #[test]
    fn test_complete_for_boot() {
        let config = Config::example();
        assert!(config.is_complete_for_boot());

        let mut no_endpoint = config.clone();
        no_endpoint.cluster.as_mut().unwrap().control_plane = None;
        assert!(!no_endpoint.is_complete_for_boot());

        let mut no_machine = config;
        no_machine.machine = None;
        assert!(!no_machine.is_complete_for_boot());
    }

    #[test]
    fn test_defaults() {
        let config = Config {
            version: "v1alpha1".to_string(),
            ..Config::default()
        };
        assert_eq!(config.pod_cidrs(), vec!["10.244.0.0/16".to_string()]);
        assert_eq!(config.service_cidrs(), vec!["10.96.0.0/12".to_string()]);
        assert_eq!(config.dns_domain(), "cluster.local");
        assert_eq!(config.local_api_server_port(), 6443);
    }

    #[test]
    fn test_validate_install_disk_required_on_metal() {
        let mut config = Config::example();
        config.machine.as_mut().unwrap().install = None;
        assert!(!DocumentSpec::validate(&config, &ValidationMode::metal()).is_ok());
        assert!(DocumentSpec::validate(&config, &ValidationMode::container()).is_ok());
        assert!(DocumentSpec::validate(&config, &ValidationMode::disk()).is_ok());
    }

    #[test]
    fn test_validate_bad_subnet() {
        let mut config = Config::example();
        config.cluster.as_mut().unwrap().network.as_mut().unwrap().pod_subnets = vec!["10.244.0.0".to_string()];
        let report = DocumentSpec::validate(&config, &ValidationMode::disk());
        assert!(report.errors()[0].contains("podSubnets"));
    }

    #[test]
    fn test_redact() {
        let mut config = Config::example();
        DocumentSpec::redact(&mut config, "******");
        assert_eq!(config.machine.as_ref().unwrap().token, "******");
        assert_eq!(config.cluster.as_ref().unwrap().token, "******");
        // empty secrets stay empty
        assert_eq!(config.cluster.as_ref().unwrap().secret, "");
        assert_eq!(config.cluster_name(), Some("cluster-X"));
    }
}

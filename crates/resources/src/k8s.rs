//! Kubernetes control-plane projections (`k8s` namespace).

use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Namespace of control-plane resources.
pub const NAMESPACE: &str = "k8s";

/// ID shared by the control-plane component singletons.
pub const CONTROL_PLANE_ID: &str = "control-plane";

macro_rules! k8s_resource {
    ($spec:ty, $type:literal) => {
        impl ResourceSpec for $spec {
            const TYPE: &'static str = $type;
            const NAMESPACE: &'static str = NAMESPACE;
        }
    };
}

/// kube-apiserver settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    /// Container image
    pub image: String,
    /// Cloud provider, `external` when an external provider is enabled
    pub cloud_provider: String,
    /// Cluster control-plane endpoint
    pub control_plane_endpoint: String,
    /// etcd client URLs
    pub etcd_servers: Vec<String>,
    /// Port the API server listens on
    pub local_port: u16,
    /// Service CIDRs
    pub service_cidrs: Vec<String>,
    /// User-supplied arguments
    pub extra_args: BTreeMap<String, String>,
    /// Environment variables
    pub environment_variables: BTreeMap<String, String>,
    /// Whether pod security policies are enforced
    pub pod_security_policy_enabled: bool,
    /// Address advertised to members of the cluster, empty to let the API
    /// server pick one
    pub advertised_address: String,
}

k8s_resource!(ApiServerConfig, "APIServerConfigs.kubernetes.talos.dev");

/// kube-controller-manager settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerManagerConfig {
    /// Whether the component runs
    pub enabled: bool,
    /// Container image
    pub image: String,
    /// Cloud provider
    pub cloud_provider: String,
    /// Pod CIDRs
    pub pod_cidrs: Vec<String>,
    /// Service CIDRs
    pub service_cidrs: Vec<String>,
    /// User-supplied arguments
    pub extra_args: BTreeMap<String, String>,
    /// Environment variables
    pub environment_variables: BTreeMap<String, String>,
}

k8s_resource!(ControllerManagerConfig, "ControllerManagerConfigs.kubernetes.talos.dev");

/// kube-scheduler settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Whether the component runs
    pub enabled: bool,
    /// Container image
    pub image: String,
    /// User-supplied arguments
    pub extra_args: BTreeMap<String, String>,
    /// Environment variables
    pub environment_variables: BTreeMap<String, String>,
    /// KubeSchedulerConfiguration
    pub config: Option<serde_yaml::Value>,
}

k8s_resource!(SchedulerConfig, "SchedulerConfigs.kubernetes.talos.dev");

/// Admission plugin configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionPlugin {
    /// Plugin name
    pub name: String,
    /// Plugin configuration
    pub configuration: Option<serde_yaml::Value>,
}

/// Admission control settings of the API server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdmissionControlConfig {
    /// Configured plugins, in order
    pub config: Vec<AdmissionPlugin>,
}

k8s_resource!(AdmissionControlConfig, "AdmissionControlConfigs.kubernetes.talos.dev");

/// Audit policy of the API server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditPolicyConfig {
    /// Policy document
    pub config: serde_yaml::Value,
}

k8s_resource!(AuditPolicyConfig, "AuditPolicyConfigs.kubernetes.talos.dev");

/// Settings of the manifests applied when the cluster bootstraps.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapManifestsConfig {
    /// Control-plane endpoint
    pub server: String,
    /// Cluster DNS domain
    pub cluster_domain: String,
    /// Pod CIDRs
    pub pod_cidrs: Vec<String>,
    /// Whether kube-proxy is deployed
    pub proxy_enabled: bool,
    /// kube-proxy image
    pub proxy_image: String,
    /// kube-proxy arguments
    pub proxy_args: Vec<String>,
    /// Whether CoreDNS is deployed
    pub core_dns_enabled: bool,
    /// CoreDNS image
    pub core_dns_image: String,
    /// Cluster DNS service IP
    pub dns_service_ip: String,
    /// Whether flannel is deployed as the CNI
    pub flannel_enabled: bool,
    /// Whether pod security policies are enforced
    pub pod_security_policy_enabled: bool,
    /// Whether the machine API is exposed to Kubernetes
    pub talos_api_service_enabled: bool,
}

k8s_resource!(BootstrapManifestsConfig, "BootstrapManifestsConfigs.kubernetes.talos.dev");

/// A manifest applied in addition to the bootstrap manifests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraManifest {
    /// Manifest name
    pub name: String,
    /// Download URL, empty for inline manifests
    pub url: String,
    /// Application order
    pub priority: String,
    /// Headers sent when downloading
    pub extra_headers: BTreeMap<String, String>,
    /// Inline manifest contents
    pub inline_manifest: String,
}

/// Extra and inline manifests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraManifestsConfig {
    /// Manifests in application order
    pub extra_manifests: Vec<ExtraManifest>,
}

k8s_resource!(ExtraManifestsConfig, "ExtraManifestsConfigs.kubernetes.talos.dev");

/// ID of the API server endpoint list.
pub const CONTROL_PLANE_API_SERVER_ENDPOINTS_ID: &str = "kube-apiserver";

/// Addresses of control-plane nodes running the API server, discovered by
/// the cluster membership subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    /// Node addresses
    pub addresses: Vec<IpAddr>,
}

k8s_resource!(Endpoint, "Endpoints.kubernetes.talos.dev");

/// ID of the node name singleton.
pub const NODENAME_ID: &str = "nodename";

/// Name the node registers with in Kubernetes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Nodename {
    /// Node name
    pub nodename: String,
}

k8s_resource!(Nodename, "Nodenames.kubernetes.talos.dev");

/// ID of the machine API access singleton.
pub const KUBEACCESS_ID: &str = "config";

/// Access to the machine API from inside Kubernetes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeaccessConfig {
    /// Whether access is enabled
    pub enabled: bool,
    /// Roles service accounts may request
    pub allowed_api_roles: Vec<String>,
    /// Namespaces service accounts may live in
    pub allowed_kubernetes_namespaces: Vec<String>,
}

impl ResourceSpec for KubeaccessConfig {
    const TYPE: &'static str = "KubernetesAccessConfigs.cluster.talos.dev";
    const NAMESPACE: &'static str = crate::config::NAMESPACE;
}

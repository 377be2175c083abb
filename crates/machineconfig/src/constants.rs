//! Well-known defaults shared by documents and derived resources.

use std::time::Duration;

/// Kubernetes version the default images are pinned to.
pub const DEFAULT_KUBERNETES_VERSION: &str = "1.34.1";

/// Default API server image repository.
pub const KUBERNETES_API_SERVER_IMAGE: &str = "registry.k8s.io/kube-apiserver";

/// Default controller manager image repository.
pub const KUBERNETES_CONTROLLER_MANAGER_IMAGE: &str = "registry.k8s.io/kube-controller-manager";

/// Default scheduler image repository.
pub const KUBERNETES_SCHEDULER_IMAGE: &str = "registry.k8s.io/kube-scheduler";

/// Default kube-proxy image repository.
pub const KUBERNETES_PROXY_IMAGE: &str = "registry.k8s.io/kube-proxy";

/// Default CoreDNS image repository.
pub const COREDNS_IMAGE: &str = "registry.k8s.io/coredns/coredns";

/// CoreDNS version the default image is pinned to.
pub const DEFAULT_COREDNS_VERSION: &str = "v1.12.4";

/// Port the API server listens on by default.
pub const DEFAULT_API_SERVER_PORT: u16 = 6443;

/// etcd client port.
pub const ETCD_CLIENT_PORT: u16 = 2379;

/// Kubelet API port.
pub const KUBELET_PORT: u16 = 10250;

/// Machine API port published through the kubeaccess endpoints.
pub const APID_PORT: u16 = 50000;

/// Default pod CIDR.
pub const DEFAULT_POD_SUBNET: &str = "10.244.0.0/16";

/// Default service CIDR.
pub const DEFAULT_SERVICE_SUBNET: &str = "10.96.0.0/12";

/// Default cluster DNS domain.
pub const DEFAULT_DNS_DOMAIN: &str = "cluster.local";

/// Default CNI.
pub const FLANNEL_CNI: &str = "flannel";

/// Kubeconfig path kube-proxy is forced to use.
pub const KUBE_PROXY_KUBECONFIG: &str = "/etc/kubernetes/kubeconfig-kube-proxy";

/// Directory holding the control-plane PKI inside static pods.
pub const KUBERNETES_PKI_DIR: &str = "/system/secrets/kubernetes";

/// Placeholder substituted by the kubelet with the pod IP.
pub const POD_IP_PLACEHOLDER: &str = "$(POD_IP)";

/// Minimum MTU accepted for KubeSpan.
pub const KUBESPAN_MIN_MTU: u32 = 1280;

/// Name of the siderolink wireguard link.
pub const SIDEROLINK_LINK_NAME: &str = "siderolink";

/// Keepalive interval configured on the siderolink peer.
pub const WIREGUARD_PERSISTENT_KEEPALIVE: Duration = Duration::from_secs(25);

/// A peer without a handshake for this long is considered down.
pub const WIREGUARD_PEER_DOWN_INTERVAL: Duration = Duration::from_secs(135);

/// Maximum size of a machine configuration.
pub const MAX_CONFIG_SIZE: usize = 4 * 1024 * 1024;

/// Replacement used when redacting secrets for display.
pub const REDACTED: &str = "******";

/// Name of the canonical config file on the state partition.
pub const CONFIG_FILENAME: &str = "config.yaml";

/// MTU of the siderolink wireguard link.
pub const SIDEROLINK_MTU: u32 = 1280;

//! Kubernetes-facing derivations: control-plane component specs, node
//! address filters, and machine API access from inside the cluster.

pub mod address_filter;
pub mod control_plane;
pub mod kubeaccess_config;
pub mod kubeaccess_crd;
pub mod kubeaccess_endpoint;

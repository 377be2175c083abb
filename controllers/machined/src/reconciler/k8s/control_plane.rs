//! Control-plane component specs.
//!
//! On control-plane nodes the cluster section of the active configuration is
//! projected into seven specs, one per component. On any other node (or
//! without a configuration) the specs are destroyed.

use crate::args::{ArgsBuilder, MergePolicy};
use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::reconciler::active_config;
use crate::runtime::{Input, Reconcile};
use machineconfig::constants;
use machineconfig::net::Prefix;
use machineconfig::types::v1alpha1::{ClusterConfig, Config};
use resources::State;
use resources::config::{MACHINE_TYPE_ID, MachineConfig, MachineTypeSpec};
use resources::k8s::{
    AdmissionControlConfig, AdmissionPlugin, ApiServerConfig, AuditPolicyConfig, BootstrapManifestsConfig,
    CONTROL_PLANE_ID, ControllerManagerConfig, ExtraManifest, ExtraManifestsConfig, SchedulerConfig,
};
use tracing::debug;

/// Owner of the control-plane specs.
pub const CONTROL_PLANE_OWNER: &str = "k8s.ControlPlaneController";

/// Cloud provider value when an external provider is enabled.
pub const EXTERNAL_CLOUD_PROVIDER: &str = "external";

/// Projects the cluster configuration into control-plane component specs.
#[derive(Debug, Default)]
pub struct ControlPlaneController;

fn image(configured: &str, repository: &str, version: &str) -> String {
    if configured.is_empty() {
        format!("{}:{}", repository, version)
    } else {
        configured.to_string()
    }
}

fn kubernetes_version() -> String {
    format!("v{}", constants::DEFAULT_KUBERNETES_VERSION)
}

fn cloud_provider(cluster: &ClusterConfig) -> String {
    if cluster.external_cloud_provider.as_ref().is_some_and(|p| p.enabled) {
        EXTERNAL_CLOUD_PROVIDER.to_string()
    } else {
        String::new()
    }
}

/// The 10th address of the first service CIDR.
pub fn dns_service_ip(service_cidrs: &[String]) -> Result<String, ControllerError> {
    let Some(first) = service_cidrs.first() else {
        return Ok(String::new());
    };
    let prefix: Prefix = first
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("service CIDR {:?}: {}", first, e)))?;
    prefix
        .nth(10)
        .map(|ip| ip.to_string())
        .ok_or_else(|| ControllerError::InvalidConfig(format!("service CIDR {:?} is too small", first)))
}

/// kube-proxy arguments: a fixed baseline merged with the user's extra
/// arguments. The kubeconfig cannot be overridden.
pub fn proxy_args(config: &Config) -> Result<Vec<String>, ControllerError> {
    let proxy = config.cluster.as_ref().and_then(|c| c.proxy.clone()).unwrap_or_default();
    let mode = if proxy.mode.is_empty() { "iptables" } else { proxy.mode.as_str() };

    let builder = ArgsBuilder::new([
        ("cluster-cidr", config.pod_cidrs().join(",")),
        ("hostname-override", "$(NODE_NAME)".to_string()),
        ("kubeconfig", constants::KUBE_PROXY_KUBECONFIG.to_string()),
        ("proxy-mode", mode.to_string()),
        ("conntrack-max-per-core", "0".to_string()),
    ])
    .policy("kubeconfig", MergePolicy::Denied)
    .merge(&proxy.extra_args)?;

    Ok(builder.build())
}

/// The seven control-plane specs for `config`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlaneSpecs {
    /// kube-apiserver
    pub api_server: ApiServerConfig,
    /// kube-controller-manager
    pub controller_manager: ControllerManagerConfig,
    /// kube-scheduler
    pub scheduler: SchedulerConfig,
    /// Admission control
    pub admission_control: AdmissionControlConfig,
    /// Audit policy
    pub audit_policy: AuditPolicyConfig,
    /// Bootstrap manifests
    pub bootstrap_manifests: BootstrapManifestsConfig,
    /// Extra manifests
    pub extra_manifests: ExtraManifestsConfig,
}

fn default_audit_policy() -> serde_yaml::Value {
    let mut rule = serde_yaml::Mapping::new();
    rule.insert("level".into(), "Metadata".into());

    let mut policy = serde_yaml::Mapping::new();
    policy.insert("apiVersion".into(), "audit.k8s.io/v1".into());
    policy.insert("kind".into(), "Policy".into());
    policy.insert("rules".into(), serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(rule)]));
    serde_yaml::Value::Mapping(policy)
}

/// Projects `config` into control-plane specs.
pub fn project(config: &Config) -> Result<ControlPlaneSpecs, ControllerError> {
    let cluster = config.cluster.clone().unwrap_or_default();
    let api = cluster.api_server.clone().unwrap_or_default();
    let controller_manager = cluster.controller_manager.clone().unwrap_or_default();
    let scheduler = cluster.scheduler.clone().unwrap_or_default();
    let proxy = cluster.proxy.clone().unwrap_or_default();
    let core_dns = cluster.core_dns.clone().unwrap_or_default();
    let version = kubernetes_version();
    let endpoint = config.control_plane_endpoint().unwrap_or_default().to_string();
    let service_cidrs = config.service_cidrs();
    let pod_security_policy_enabled = !api.disable_pod_security_policy;

    let advertised_address = if config.kubelet_skip_node_registration() {
        String::new()
    } else {
        constants::POD_IP_PLACEHOLDER.to_string()
    };

    let api_server = ApiServerConfig {
        image: image(&api.image, constants::KUBERNETES_API_SERVER_IMAGE, &version),
        cloud_provider: cloud_provider(&cluster),
        control_plane_endpoint: endpoint.clone(),
        etcd_servers: vec![format!("https://localhost:{}", constants::ETCD_CLIENT_PORT)],
        local_port: config.local_api_server_port(),
        service_cidrs: service_cidrs.clone(),
        extra_args: api.extra_args.clone(),
        environment_variables: api.env.clone(),
        pod_security_policy_enabled,
        advertised_address,
    };

    let controller_manager = ControllerManagerConfig {
        enabled: true,
        image: image(
            &controller_manager.image,
            constants::KUBERNETES_CONTROLLER_MANAGER_IMAGE,
            &version,
        ),
        cloud_provider: cloud_provider(&cluster),
        pod_cidrs: config.pod_cidrs(),
        service_cidrs: service_cidrs.clone(),
        extra_args: controller_manager.extra_args,
        environment_variables: controller_manager.env,
    };

    let scheduler = SchedulerConfig {
        enabled: true,
        image: image(&scheduler.image, constants::KUBERNETES_SCHEDULER_IMAGE, &version),
        extra_args: scheduler.extra_args,
        environment_variables: scheduler.env,
        config: scheduler.config,
    };

    let admission_control = AdmissionControlConfig {
        config: api
            .admission_control
            .iter()
            .map(|plugin| AdmissionPlugin {
                name: plugin.name.clone(),
                configuration: plugin.configuration.clone(),
            })
            .collect(),
    };

    let audit_policy = AuditPolicyConfig {
        config: api.audit_policy.clone().unwrap_or_else(default_audit_policy),
    };

    let bootstrap_manifests = BootstrapManifestsConfig {
        server: endpoint,
        cluster_domain: config.dns_domain(),
        pod_cidrs: config.pod_cidrs(),
        proxy_enabled: !proxy.disabled,
        proxy_image: image(&proxy.image, constants::KUBERNETES_PROXY_IMAGE, &version),
        proxy_args: proxy_args(config)?,
        core_dns_enabled: !core_dns.disabled,
        core_dns_image: image(
            &core_dns.image,
            constants::COREDNS_IMAGE,
            constants::DEFAULT_COREDNS_VERSION,
        ),
        dns_service_ip: dns_service_ip(&service_cidrs)?,
        flannel_enabled: config.cni_name() == constants::FLANNEL_CNI,
        pod_security_policy_enabled,
        talos_api_service_enabled: config.kubernetes_api_access().is_some(),
    };

    let mut manifests = Vec::new();
    if let Some(provider) = cluster.external_cloud_provider.as_ref().filter(|p| p.enabled) {
        manifests.extend(provider.manifests.iter().map(|url| ExtraManifest {
            name: url.clone(),
            url: url.clone(),
            priority: "30".to_string(),
            ..ExtraManifest::default()
        }));
    }
    manifests.extend(cluster.extra_manifests.iter().map(|url| ExtraManifest {
        name: url.clone(),
        url: url.clone(),
        priority: "99".to_string(),
        extra_headers: cluster.extra_manifest_headers.clone(),
        inline_manifest: String::new(),
    }));
    manifests.extend(cluster.inline_manifests.iter().map(|inline| ExtraManifest {
        name: inline.name.clone(),
        priority: "99".to_string(),
        inline_manifest: inline.contents.clone(),
        ..ExtraManifest::default()
    }));

    Ok(ControlPlaneSpecs {
        api_server,
        controller_manager,
        scheduler,
        admission_control,
        audit_policy,
        bootstrap_manifests,
        extra_manifests: ExtraManifestsConfig {
            extra_manifests: manifests,
        },
    })
}

#[async_trait::async_trait]
impl Reconcile for ControlPlaneController {
    fn name(&self) -> &'static str {
        CONTROL_PLANE_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<MachineConfig>(), Input::of::<MachineTypeSpec>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, CONTROL_PLANE_OWNER);

        let control_plane = state
            .try_get::<MachineTypeSpec>(MACHINE_TYPE_ID)?
            .is_some_and(|t| t.spec.machine_type.is_control_plane());
        let legacy = active_config(state)?.and_then(|config| config.legacy().cloned());

        match legacy {
            Some(config) if control_plane => {
                let specs = project(&config)?;
                outputs.modify(CONTROL_PLANE_ID, specs.api_server)?;
                outputs.modify(CONTROL_PLANE_ID, specs.controller_manager)?;
                outputs.modify(CONTROL_PLANE_ID, specs.scheduler)?;
                outputs.modify(CONTROL_PLANE_ID, specs.admission_control)?;
                outputs.modify(CONTROL_PLANE_ID, specs.audit_policy)?;
                outputs.modify(CONTROL_PLANE_ID, specs.bootstrap_manifests)?;
                outputs.modify(CONTROL_PLANE_ID, specs.extra_manifests)?;
            }
            _ => debug!("Not a control-plane node, removing control-plane specs"),
        }

        outputs.cleanup::<ApiServerConfig>()?;
        outputs.cleanup::<ControllerManagerConfig>()?;
        outputs.cleanup::<SchedulerConfig>()?;
        outputs.cleanup::<AdmissionControlConfig>()?;
        outputs.cleanup::<AuditPolicyConfig>()?;
        outputs.cleanup::<BootstrapManifestsConfig>()?;
        outputs.cleanup::<ExtraManifestsConfig>()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "control_plane_test.rs"]
mod control_plane_test;

//! machined
//!
//! Node-local controllers owning the machine configuration:
//! - Acquisition: state partition, platform, then maintenance mode
//! - Persistence: writes the active configuration back to the state partition
//! - Derivations: machine type, control plane specs, kubeaccess, siderolink
//! - Diagnostics: conditions operators should look at
//!
//! Every controller runs until SIGINT, restarted with backoff on failure.

mod acquire;
mod args;
mod backoff;
mod config;
mod error;
mod events;
mod kubernetes;
mod persistence;
mod reconcile_helpers;
mod reconciler;
mod runtime;
mod wireguard;

#[cfg(test)]
mod test_utils;

use crate::acquire::AcquireController;
use crate::config::{LogFormat, MachinedConfig};
use crate::error::ControllerError;
use crate::events::{EventBus, LogPlatformEvents, StateConfigSetter};
use crate::kubernetes::{KubeClientSource, KubeCsrs, KubeEndpointSlices, LOCK_NAMESPACE, LeaseLock};
use crate::persistence::PersistenceController;
use crate::reconciler::diagnostics::address_overlap::AddressOverlapCheck;
use crate::reconciler::diagnostics::kubelet_csr::{HttpsKubeletProbe, KubeletCsrCheck};
use crate::reconciler::diagnostics::{DiagnosticCheck, DiagnosticsController};
use crate::reconciler::k8s::address_filter::AddressFilterController;
use crate::reconciler::k8s::control_plane::ControlPlaneController;
use crate::reconciler::k8s::kubeaccess_config::KubeaccessConfigController;
use crate::reconciler::k8s::kubeaccess_crd::KubeaccessCrdController;
use crate::reconciler::k8s::kubeaccess_endpoint::KubeaccessEndpointController;
use crate::reconciler::machine_type::MachineTypeController;
use crate::reconciler::siderolink::config::SiderolinkConfigController;
use crate::reconciler::siderolink::manager::{SiderolinkManager, http_client_factory};
use crate::reconciler::siderolink::status::SiderolinkStatusController;
use crate::reconciler::siderolink::userspace::{ProcessDevice, TcpRelay, UserspaceWireguardController};
use crate::runtime::ControllerRuntime;
use crate::wireguard::UapiDevice;
use platform::Cmdline;
use resources::State;
use resources::config::{ACQUIRE_ID, AcquireConfigSpec};
use resources::k8s::{NODENAME_ID, Nodename};
use resources::runtime::{
    KERNEL_CMDLINE_ID, KernelCmdline, SYSTEM_INFORMATION_ID, SystemInformation, UNIQUE_TOKEN_ID, UniqueMachineToken,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Owner of the resources seeded at startup.
const BOOT_OWNER: &str = "machined";

/// SMBIOS system UUID, used when none is configured.
const PRODUCT_UUID_PATH: &str = "/sys/class/dmi/id/product_uuid";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Resources describing the node itself.
async fn seed(state: &State, config: &MachinedConfig) -> Result<Cmdline, ControllerError> {
    let cmdline = read_trimmed(&config.cmdline_path).await.unwrap_or_default();
    state.create(BOOT_OWNER, KERNEL_CMDLINE_ID, KernelCmdline { cmdline: cmdline.clone() })?;

    let uuid = match &config.node_uuid {
        Some(uuid) => Some(uuid.clone()),
        None => read_trimmed(Path::new(PRODUCT_UUID_PATH)).await,
    };
    if let Some(uuid) = uuid {
        state.create(BOOT_OWNER, SYSTEM_INFORMATION_ID, SystemInformation { uuid })?;
    }
    if let Some(token) = &config.unique_token {
        state.create(BOOT_OWNER, UNIQUE_TOKEN_ID, UniqueMachineToken { token: token.clone() })?;
    }
    if let Some(nodename) = &config.node_name {
        state.create(
            BOOT_OWNER,
            NODENAME_ID,
            Nodename {
                nodename: nodename.clone(),
            },
        )?;
    }

    Ok(Cmdline::parse(&cmdline))
}

/// Identity written into the Lease while holding the CRD lock.
fn lock_holder(config: &MachinedConfig) -> String {
    config
        .node_name
        .clone()
        .or_else(|| config.node_uuid.clone())
        .unwrap_or_else(|| format!("machined-{}", uuid::Uuid::new_v4()))
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = MachinedConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting machined");
    config.log();

    let state = State::new();
    let cmdline = seed(&state, &config).await?;
    let platform: Arc<dyn platform::PlatformConfigurator> = Arc::from(platform::from_cmdline(&cmdline)?);
    info!("Platform: {}", platform.name());

    let mut runtime = ControllerRuntime::new(state.clone());

    runtime.register(AcquireController::new(
        platform,
        Arc::new(LogPlatformEvents),
        Arc::new(EventBus::default()),
        Arc::new(StateConfigSetter::new(state.clone())),
        config.state_config_path.clone(),
        config.mode.validation_mode(),
    ));

    runtime
        .register_reconciler(PersistenceController::new())
        .register_reconciler(MachineTypeController)
        .register_reconciler(ControlPlaneController)
        .register_reconciler(AddressFilterController)
        .register_reconciler(KubeaccessConfigController)
        .register_reconciler(SiderolinkConfigController)
        .register_reconciler(SiderolinkManager::new(http_client_factory()))
        .register_reconciler(SiderolinkStatusController::new(
            Arc::new(UapiDevice::default()),
            config.siderolink_status_interval,
        ));
    runtime.register(UserspaceWireguardController::new(
        Arc::new(ProcessDevice::default()),
        Arc::new(TcpRelay),
    ));

    let mut checks: Vec<Box<dyn DiagnosticCheck>> = vec![Box::new(AddressOverlapCheck)];

    if let Some(kubeconfig) = &config.kubeconfig {
        let source = Arc::new(KubeClientSource::new(Some(kubeconfig.clone())));

        checks.push(Box::new(KubeletCsrCheck::new(
            Arc::new(HttpsKubeletProbe::new()?),
            Arc::new(KubeCsrs::new(Arc::clone(&source))),
        )));
        runtime.register_reconciler(KubeaccessEndpointController::new(Arc::new(KubeEndpointSlices::new(
            Arc::clone(&source),
        ))));
        runtime.register(KubeaccessCrdController::new(
            Arc::clone(&source),
            Arc::new(LeaseLock::new(Arc::clone(&source), LOCK_NAMESPACE)),
            lock_holder(&config),
        ));
    }

    runtime.register_reconciler(DiagnosticsController::new(checks));

    // Acquisition starts once its request exists.
    state.create(BOOT_OWNER, ACQUIRE_ID, AcquireConfigSpec)?;

    let cancel = runtime.cancellation_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down");
        cancel.cancel();
    });

    runtime
        .run()
        .await
        .map_err(|e| ControllerError::Reconciliation(e.to_string()))?;

    info!("machined stopped");
    Ok(())
}

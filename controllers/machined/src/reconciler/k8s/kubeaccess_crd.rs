//! The `ServiceAccount` custom resource.
//!
//! Workloads request machine API access by creating a
//! `serviceaccounts.talos.dev` object naming the roles they want. Every
//! control-plane node with access enabled runs this controller, but only the
//! holder of the cluster-wide lock installs the CRD and judges requests.

use crate::error::ControllerError;
use crate::kubernetes::{DistributedLock, KubeClientSource, with_lock};
use crate::runtime::{Controller, ControllerContext, Input, Wake, wait_for_change};
use futures::TryStreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResource, CustomResourceExt, ResourceExt};
use kube_runtime::watcher;
use resources::State;
use resources::k8s::{KUBEACCESS_ID, KubeaccessConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the controller.
pub const KUBEACCESS_CRD_OWNER: &str = "kubeaccess.CRDController";

/// Lock serializing CRD management across control-plane nodes.
pub const CRD_LOCK_NAME: &str = "talos-crd-controller";

const FIELD_MANAGER: &str = "machined";

/// Machine API access requested by a workload.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "talos.dev",
    version = "v1alpha1",
    kind = "ServiceAccount",
    namespaced,
    status = "ServiceAccountStatus",
    shortname = "tsa"
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    /// Requested machine API roles
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Observed state of a `ServiceAccount`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountStatus {
    /// Why the request was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Checks a request against the allowed roles and namespaces.
pub fn validate(namespace: &str, spec: &ServiceAccountSpec, access: &KubeaccessConfig) -> Result<(), String> {
    if !access.allowed_kubernetes_namespaces.iter().any(|n| n == namespace) {
        return Err(format!("namespace is not allowed: {}", namespace));
    }

    if let Some(role) = spec
        .roles
        .iter()
        .find(|role| !access.allowed_api_roles.contains(role))
    {
        return Err(format!("role is not allowed: {}", role));
    }

    Ok(())
}

/// The access configuration while access is enabled.
pub fn enabled_access(state: &State) -> Result<Option<KubeaccessConfig>, ControllerError> {
    Ok(state
        .try_get::<KubeaccessConfig>(KUBEACCESS_ID)?
        .map(|resource| resource.spec)
        .filter(|access| access.enabled))
}

/// Installs the `ServiceAccount` CRD and judges requests.
pub struct KubeaccessCrdController {
    source: Arc<KubeClientSource>,
    lock: Arc<dyn DistributedLock>,
    holder: String,
}

impl std::fmt::Debug for KubeaccessCrdController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeaccessCrdController")
            .field("holder", &self.holder)
            .finish()
    }
}

impl KubeaccessCrdController {
    /// Controller taking `lock` as `holder`.
    pub fn new(source: Arc<KubeClientSource>, lock: Arc<dyn DistributedLock>, holder: impl Into<String>) -> Self {
        Self {
            source,
            lock,
            holder: holder.into(),
        }
    }
}

async fn ensure_crd(client: Client) -> Result<(), ControllerError> {
    let api: Api<CustomResourceDefinition> = Api::all(client);
    let crd = ServiceAccount::crd();
    let name = crd.name_any();
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&crd))
        .await?;
    info!("Installed CRD {}", name);
    Ok(())
}

async fn judge(client: Client, account: &ServiceAccount, access: &KubeaccessConfig) -> Result<(), ControllerError> {
    let namespace = account.namespace().unwrap_or_default();
    let name = account.name_any();
    let failure_reason = validate(&namespace, &account.spec, access).err();

    if account.status.as_ref().is_some_and(|s| s.failure_reason == failure_reason) {
        return Ok(());
    }

    match &failure_reason {
        Some(reason) => warn!("Refusing service account {}/{}: {}", namespace, name, reason),
        None => info!("Accepted service account {}/{} with roles {:?}", namespace, name, account.spec.roles),
    }

    let api: Api<ServiceAccount> = Api::namespaced(client, &namespace);
    // null clears a previous refusal
    let status = json!({ "status": { "failureReason": failure_reason } });
    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&status))
        .await?;
    Ok(())
}

async fn serve(client: Client, access: KubeaccessConfig, stop: CancellationToken) -> Result<(), ControllerError> {
    ensure_crd(client.clone()).await?;

    let api: Api<ServiceAccount> = Api::all(client.clone());
    let mut stream = Box::pin(watcher(api, watcher::Config::default()));

    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => return Ok(()),
            event = stream.try_next() => event
                .map_err(|e| ControllerError::Reconciliation(format!("service account watch: {}", e)))?,
        };

        match event {
            Some(watcher::Event::Apply(account)) | Some(watcher::Event::InitApply(account)) => {
                if let Err(e) = judge(client.clone(), &account, &access).await {
                    warn!("Failed to update service account {}: {}", account.name_any(), e);
                }
            }
            Some(watcher::Event::Delete(account)) => debug!("Service account {} deleted", account.name_any()),
            Some(watcher::Event::Init) | Some(watcher::Event::InitDone) => {}
            None => return Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Controller for KubeaccessCrdController {
    fn name(&self) -> &'static str {
        KUBEACCESS_CRD_OWNER
    }

    async fn run(&mut self, ctx: &ControllerContext) -> Result<(), ControllerError> {
        let inputs = [Input::of::<KubeaccessConfig>()];
        let mut events = ctx.state.watch();

        loop {
            if let Some(access) = enabled_access(&ctx.state)? {
                let client = self.source.client().await?;
                let stop = ctx.cancel.child_token();
                let serving = with_lock(self.lock.as_ref(), CRD_LOCK_NAME, &self.holder, &stop, || {
                    serve(client, access.clone(), stop.clone())
                });
                tokio::pin!(serving);

                // Serve until the access configuration changes.
                loop {
                    tokio::select! {
                        result = &mut serving => {
                            result?;
                            break;
                        }
                        wake = wait_for_change(&mut events, &inputs, None, &ctx.cancel) => {
                            if wake == Wake::Cancelled || enabled_access(&ctx.state)?.as_ref() != Some(&access) {
                                stop.cancel();
                                (&mut serving).await?;
                                break;
                            }
                        }
                    }
                }

                if ctx.cancel.is_cancelled() {
                    return Ok(());
                }
                continue;
            }

            if wait_for_change(&mut events, &inputs, None, &ctx.cancel).await == Wake::Cancelled {
                return Ok(());
            }
        }
    }
}

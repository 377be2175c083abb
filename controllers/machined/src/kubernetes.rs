//! Kubernetes API access.
//!
//! The node talks to its own cluster for three things: publishing the
//! machine API endpoints, serializing cluster-wide writes through a `Lease`
//! based lock, and looking up kubelet serving CSRs for diagnostics. Each is a
//! trait so controllers can be tested without a cluster.
//!
//! The client is built lazily: the API server usually comes up well after
//! the controllers start.

use crate::error::ControllerError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use k8s_openapi::api::coordination::v1::Lease;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::discovery::v1::{Endpoint, EndpointConditions, EndpointPort, EndpointSlice};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use machineconfig::constants::APID_PORT;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Namespace of the machine API service and its endpoint slices.
pub const SERVICE_NAMESPACE: &str = "default";

/// Name of the machine API service.
pub const SERVICE_NAME: &str = "talos";

/// Name of the machine API port.
pub const APID_PORT_NAME: &str = "apid";

/// Namespace of the lock leases.
pub const LOCK_NAMESPACE: &str = "kube-system";

/// How long a lock lease is valid without renewal.
pub const LOCK_TTL: Duration = Duration::from_secs(30);

/// How often a held lock is renewed, and a busy one retried.
pub const LOCK_RENEW_INTERVAL: Duration = Duration::from_secs(10);

/// Signer of kubelet serving certificates.
pub const KUBELET_SERVING_SIGNER: &str = "kubernetes.io/kubelet-serving";

const FIELD_MANAGER: &str = "machined";
const MAX_CONFLICT_RETRIES: usize = 5;

/// HTTP status code of a failed API call.
pub fn api_error_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Builds Kubernetes clients on first use and caches them.
#[derive(Default)]
pub struct KubeClientSource {
    kubeconfig: Option<PathBuf>,
    client: OnceCell<Client>,
}

impl std::fmt::Debug for KubeClientSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClientSource")
            .field("kubeconfig", &self.kubeconfig)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl KubeClientSource {
    /// Source using `kubeconfig`, or the in-cluster/default configuration.
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            kubeconfig,
            client: OnceCell::new(),
        }
    }

    /// The client, built on first call.
    pub async fn client(&self) -> Result<Client, ControllerError> {
        self.client
            .get_or_try_init(|| async {
                let client = match &self.kubeconfig {
                    Some(path) => {
                        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                            ControllerError::InvalidConfig(format!("kubeconfig {}: {}", path.display(), e))
                        })?;
                        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                            .await
                            .map_err(|e| {
                                ControllerError::InvalidConfig(format!("kubeconfig {}: {}", path.display(), e))
                            })?;
                        Client::try_from(config)?
                    }
                    None => Client::try_default().await?,
                };
                info!("Connected to Kubernetes API");
                Ok(client)
            })
            .await
            .cloned()
    }
}

/// Cluster-wide mutual exclusion.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Take or renew lock `name` for `holder`; false while someone else
    /// holds it.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, ControllerError>;

    /// Release lock `name` if `holder` holds it.
    async fn release(&self, name: &str, holder: &str) -> Result<(), ControllerError>;
}

/// Runs `work` while holding lock `name`.
///
/// Waits for the lock, renewing it every [`LOCK_RENEW_INTERVAL`] while
/// `work` runs, and releases it afterwards. Returns `None` when cancelled
/// before the lock was taken. Losing the lock aborts `work` with an error.
pub async fn with_lock<T, Fut>(
    lock: &dyn DistributedLock,
    name: &str,
    holder: &str,
    cancel: &CancellationToken,
    work: impl FnOnce() -> Fut,
) -> Result<Option<T>, ControllerError>
where
    Fut: Future<Output = Result<T, ControllerError>>,
{
    while !lock.try_acquire(name, holder, LOCK_TTL).await? {
        debug!("Lock {} is busy, retrying in {:?}", name, LOCK_RENEW_INTERVAL);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            _ = tokio::time::sleep(LOCK_RENEW_INTERVAL) => {}
        }
    }
    info!("Acquired lock {}", name);

    let work = work();
    tokio::pin!(work);
    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            _ = tokio::time::sleep(LOCK_RENEW_INTERVAL) => {
                match lock.try_acquire(name, holder, LOCK_TTL).await {
                    Ok(true) => {}
                    Ok(false) => break Err(ControllerError::Reconciliation(format!("lost lock {}", name))),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    if let Err(e) = lock.release(name, holder).await {
        warn!("Failed to release lock {}: {}", name, e);
    }
    result.map(Some)
}

/// Lock backed by a `coordination.k8s.io/v1` Lease.
#[derive(Debug)]
pub struct LeaseLock {
    source: Arc<KubeClientSource>,
    namespace: String,
}

impl LeaseLock {
    /// Lock on leases in `namespace`.
    pub fn new(source: Arc<KubeClientSource>, namespace: impl Into<String>) -> Self {
        Self {
            source,
            namespace: namespace.into(),
        }
    }

    async fn api(&self) -> Result<Api<DynamicObject>, ControllerError> {
        let resource = ApiResource::erase::<Lease>(&());
        Ok(Api::namespaced_with(self.source.client().await?, &self.namespace, &resource))
    }
}

fn lease_object(name: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> DynamicObject {
    let now = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    DynamicObject::new(name, &ApiResource::erase::<Lease>(&())).data(json!({
        "spec": {
            "holderIdentity": holder,
            "leaseDurationSeconds": ttl.as_secs(),
            "acquireTime": now,
            "renewTime": now,
        }
    }))
}

/// Whether a lease spec is held by someone other than `holder` and still
/// valid at `now`.
pub fn lease_held_by_other(spec: &serde_json::Value, holder: &str, now: DateTime<Utc>) -> bool {
    let current = spec["holderIdentity"].as_str().unwrap_or_default();
    if current.is_empty() || current == holder {
        return false;
    }
    let duration = chrono::Duration::seconds(spec["leaseDurationSeconds"].as_i64().unwrap_or_default());
    spec["renewTime"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .is_some_and(|renewed| renewed.with_timezone(&Utc) + duration > now)
}

#[async_trait]
impl DistributedLock for LeaseLock {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, ControllerError> {
        let api = self.api().await?;
        let now = Utc::now();

        let result = match api.get_opt(name).await? {
            None => api.create(&PostParams::default(), &lease_object(name, holder, ttl, now)).await,
            Some(existing) => {
                if lease_held_by_other(&existing.data["spec"], holder, now) {
                    return Ok(false);
                }
                let mut lease = lease_object(name, holder, ttl, now);
                lease.metadata.resource_version = existing.metadata.resource_version;
                api.replace(name, &PostParams::default(), &lease).await
            }
        };

        match result {
            Ok(_) => Ok(true),
            // Someone else won the race.
            Err(e) if api_error_code(&e) == Some(409) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), ControllerError> {
        let api = self.api().await?;
        let Some(existing) = api.get_opt(name).await? else {
            return Ok(());
        };
        if existing.data["spec"]["holderIdentity"].as_str() != Some(holder) {
            return Ok(());
        }
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(e) if matches!(api_error_code(&e), Some(404 | 409)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Address family of an endpoint slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// IPv4 addresses
    IPv4,
    /// IPv6 addresses
    IPv6,
}

impl AddressType {
    /// Kubernetes name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::IPv4 => "IPv4",
            AddressType::IPv6 => "IPv6",
        }
    }
}

/// Desired endpoint slice of the machine API service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSliceSpec {
    /// Slice name
    pub name: String,
    /// Address family
    pub address_type: AddressType,
    /// Sorted, deduplicated addresses
    pub addresses: Vec<IpAddr>,
}

/// Publishes endpoint slices of the machine API service.
#[async_trait]
pub trait EndpointSliceSink: Send + Sync {
    /// Create or replace a slice.
    async fn apply(&self, slice: &EndpointSliceSpec) -> Result<(), ControllerError>;

    /// Delete slice `name`; deleting a missing slice succeeds.
    async fn delete(&self, name: &str) -> Result<(), ControllerError>;
}

/// Endpoint slice sink writing to the cluster.
#[derive(Debug)]
pub struct KubeEndpointSlices {
    source: Arc<KubeClientSource>,
}

impl KubeEndpointSlices {
    /// Sink writing through `source`.
    pub fn new(source: Arc<KubeClientSource>) -> Self {
        Self { source }
    }

    async fn ensure_service(&self, client: Client) -> Result<(), ControllerError> {
        let api: Api<Service> = Api::namespaced(client, SERVICE_NAMESPACE);
        if api.get_opt(SERVICE_NAME).await?.is_some() {
            return Ok(());
        }

        let service = Service {
            metadata: ObjectMeta {
                name: Some(SERVICE_NAME.to_string()),
                namespace: Some(SERVICE_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some(APID_PORT_NAME.to_string()),
                    port: i32::from(APID_PORT),
                    target_port: Some(IntOrString::Int(i32::from(APID_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };
        match api.create(&PostParams::default(), &service).await {
            Ok(_) => {
                info!("Created service {}/{}", SERVICE_NAMESPACE, SERVICE_NAME);
                Ok(())
            }
            Err(e) if api_error_code(&e) == Some(409) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Kubernetes object for `slice`.
pub fn endpoint_slice(slice: &EndpointSliceSpec) -> EndpointSlice {
    EndpointSlice {
        metadata: ObjectMeta {
            name: Some(slice.name.clone()),
            namespace: Some(SERVICE_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                ("kubernetes.io/service-name".to_string(), SERVICE_NAME.to_string()),
                ("endpointslice.kubernetes.io/managed-by".to_string(), FIELD_MANAGER.to_string()),
            ])),
            ..ObjectMeta::default()
        },
        address_type: slice.address_type.as_str().to_string(),
        endpoints: slice
            .addresses
            .iter()
            .map(|address| Endpoint {
                addresses: vec![address.to_string()],
                conditions: Some(EndpointConditions {
                    ready: Some(true),
                    serving: Some(true),
                    terminating: Some(false),
                }),
                ..Endpoint::default()
            })
            .collect(),
        ports: Some(vec![EndpointPort {
            name: Some(APID_PORT_NAME.to_string()),
            port: Some(i32::from(APID_PORT)),
            protocol: Some("TCP".to_string()),
            ..EndpointPort::default()
        }]),
    }
}

#[async_trait]
impl EndpointSliceSink for KubeEndpointSlices {
    async fn apply(&self, slice: &EndpointSliceSpec) -> Result<(), ControllerError> {
        let client = self.source.client().await?;
        self.ensure_service(client.clone()).await?;
        let api: Api<EndpointSlice> = Api::namespaced(client, SERVICE_NAMESPACE);
        let desired = endpoint_slice(slice);

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let result = match api.get_opt(&slice.name).await? {
                None => api.create(&PostParams::default(), &desired).await,
                Some(existing) => {
                    if existing.endpoints == desired.endpoints
                        && existing.ports == desired.ports
                        && existing.address_type == desired.address_type
                    {
                        return Ok(());
                    }
                    let mut updated = desired.clone();
                    updated.metadata.resource_version = existing.metadata.resource_version;
                    api.replace(&slice.name, &PostParams::default(), &updated).await
                }
            };

            match result {
                Ok(_) => {
                    info!("Published endpoint slice {} with {:?}", slice.name, slice.addresses);
                    return Ok(());
                }
                Err(e) if api_error_code(&e) == Some(409) => {
                    debug!("Conflict writing endpoint slice {} (attempt {})", slice.name, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ControllerError::Reconciliation(format!(
            "endpoint slice {} kept conflicting after {} attempts",
            slice.name, MAX_CONFLICT_RETRIES
        )))
    }

    async fn delete(&self, name: &str) -> Result<(), ControllerError> {
        let api: Api<EndpointSlice> = Api::namespaced(self.source.client().await?, SERVICE_NAMESPACE);
        match api.delete(name, &Default::default()).await {
            Ok(_) => {
                info!("Deleted endpoint slice {}", name);
                Ok(())
            }
            Err(e) if api_error_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Looks up certificate signing requests.
#[async_trait]
pub trait CsrLister: Send + Sync {
    /// Names of kubelet serving CSRs of `node_name` that are neither
    /// approved nor denied.
    async fn pending_serving_csrs(&self, node_name: &str) -> Result<Vec<String>, ControllerError>;
}

/// CSR lister reading from the cluster.
#[derive(Debug)]
pub struct KubeCsrs {
    source: Arc<KubeClientSource>,
}

impl KubeCsrs {
    /// Lister reading through `source`.
    pub fn new(source: Arc<KubeClientSource>) -> Self {
        Self { source }
    }
}

/// Whether `csr` is a kubelet serving CSR of `node_name` awaiting a decision.
pub fn is_pending_serving_csr(csr: &CertificateSigningRequest, node_name: &str) -> bool {
    let username = format!("system:node:{}", node_name);
    let decided = csr
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Approved" || c.type_ == "Denied")
        });

    csr.spec.signer_name == KUBELET_SERVING_SIGNER && csr.spec.username.as_deref() == Some(username.as_str()) && !decided
}

#[async_trait]
impl CsrLister for KubeCsrs {
    async fn pending_serving_csrs(&self, node_name: &str) -> Result<Vec<String>, ControllerError> {
        let api: Api<CertificateSigningRequest> = Api::all(self.source.client().await?);
        let csrs = api.list(&ListParams::default()).await?;

        Ok(csrs
            .items
            .iter()
            .filter(|csr| is_pending_serving_csr(csr, node_name))
            .filter_map(|csr| csr.metadata.name.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "kubernetes_test.rs"]
mod kubernetes_test;

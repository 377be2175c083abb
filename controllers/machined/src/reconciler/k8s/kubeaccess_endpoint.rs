//! Publishes the machine API endpoints into the cluster.
//!
//! While machine API access from Kubernetes is enabled, the control-plane
//! API server addresses are mirrored into the `talos` endpoint slices, one
//! per address family. Disabling access deletes both slices.

use crate::error::ControllerError;
use crate::kubernetes::{AddressType, EndpointSliceSink, EndpointSliceSpec};
use crate::runtime::{Input, Reconcile};
use resources::State;
use resources::k8s::{CONTROL_PLANE_API_SERVER_ENDPOINTS_ID, Endpoint, KUBEACCESS_ID, KubeaccessConfig};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Name of the controller.
pub const KUBEACCESS_ENDPOINT_OWNER: &str = "kubeaccess.EndpointController";

/// Slice holding IPv4 endpoints.
pub const IPV4_SLICE: &str = "talos";

/// Slice holding IPv6 endpoints.
pub const IPV6_SLICE: &str = "talos-ipv6";

/// Mirrors API server endpoints into endpoint slices.
pub struct KubeaccessEndpointController {
    sink: Arc<dyn EndpointSliceSink>,
    published: Option<Vec<IpAddr>>,
}

impl std::fmt::Debug for KubeaccessEndpointController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeaccessEndpointController")
            .field("published", &self.published)
            .finish()
    }
}

impl KubeaccessEndpointController {
    /// Controller writing through `sink`.
    pub fn new(sink: Arc<dyn EndpointSliceSink>) -> Self {
        Self { sink, published: None }
    }

    async fn publish(&self, addresses: &[IpAddr]) -> Result<(), ControllerError> {
        for (name, address_type) in [(IPV4_SLICE, AddressType::IPv4), (IPV6_SLICE, AddressType::IPv6)] {
            let family: Vec<IpAddr> = addresses
                .iter()
                .copied()
                .filter(|ip| ip.is_ipv4() == (address_type == AddressType::IPv4))
                .collect();

            if family.is_empty() {
                self.sink.delete(name).await?;
            } else {
                self.sink
                    .apply(&EndpointSliceSpec {
                        name: name.to_string(),
                        address_type,
                        addresses: family,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn unpublish(&self) -> Result<(), ControllerError> {
        self.sink.delete(IPV4_SLICE).await?;
        self.sink.delete(IPV6_SLICE).await
    }
}

#[async_trait::async_trait]
impl Reconcile for KubeaccessEndpointController {
    fn name(&self) -> &'static str {
        KUBEACCESS_ENDPOINT_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<KubeaccessConfig>(), Input::of::<Endpoint>()]
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let enabled = state
            .try_get::<KubeaccessConfig>(KUBEACCESS_ID)?
            .is_some_and(|config| config.spec.enabled);

        if !enabled {
            if self.published.is_some() {
                debug!("Machine API access disabled, removing endpoint slices");
                self.unpublish().await?;
                self.published = None;
            }
            return Ok(());
        }

        let Some(endpoints) = state.try_get::<Endpoint>(CONTROL_PLANE_API_SERVER_ENDPOINTS_ID)? else {
            return Ok(());
        };
        let addresses: Vec<IpAddr> = endpoints
            .spec
            .addresses
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if self.published.as_ref() == Some(&addresses) {
            return Ok(());
        }

        self.publish(&addresses).await?;
        self.published = Some(addresses);
        Ok(())
    }
}

//! Health of the management link.

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::runtime::{Input, Reconcile};
use crate::wireguard::WireguardDevice;
use chrono::{DateTime, Utc};
use machineconfig::constants::{SIDEROLINK_LINK_NAME, WIREGUARD_PEER_DOWN_INTERVAL};
use resources::State;
use resources::siderolink::{ID, SiderolinkConfig, SiderolinkStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Owner of the siderolink status.
pub const SIDEROLINK_STATUS_OWNER: &str = "siderolink.StatusController";

/// Whether a peer whose last handshake was at `handshake` is up at `now`.
pub fn peer_up(handshake: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let threshold = chrono::Duration::from_std(WIREGUARD_PEER_DOWN_INTERVAL).unwrap_or(chrono::Duration::MAX);
    handshake.is_some_and(|at| now - at < threshold)
}

/// Probes the siderolink device and reports whether the peer is up.
pub struct SiderolinkStatusController {
    device: Arc<dyn WireguardDevice>,
    interval: Duration,
}

impl std::fmt::Debug for SiderolinkStatusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiderolinkStatusController")
            .field("interval", &self.interval)
            .finish()
    }
}

impl SiderolinkStatusController {
    /// Controller probing `device` every `interval`.
    pub fn new(device: Arc<dyn WireguardDevice>, interval: Duration) -> Self {
        Self { device, interval }
    }
}

#[async_trait::async_trait]
impl Reconcile for SiderolinkStatusController {
    fn name(&self) -> &'static str {
        SIDEROLINK_STATUS_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::of::<SiderolinkConfig>()]
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, SIDEROLINK_STATUS_OWNER);

        if let Some(config) = state.try_get::<SiderolinkConfig>(ID)? {
            let handshake = match self.device.last_handshake(SIDEROLINK_LINK_NAME).await {
                Ok(handshake) => handshake,
                Err(e) => {
                    warn!("Failed to inspect {}: {}", SIDEROLINK_LINK_NAME, e);
                    None
                }
            };
            let connected = peer_up(handshake, Utc::now());
            debug!("Siderolink peer connected: {} (last handshake {:?})", connected, handshake);

            outputs.modify(
                ID,
                SiderolinkStatus {
                    host: config.spec.host,
                    connected,
                },
            )?;
        }

        outputs.cleanup::<SiderolinkStatus>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::siderolink::config::from_api_url;
    use crate::test_utils::StaticWireguardDevice;

    fn setup() -> State {
        let state = State::new();
        state
            .create(
                "siderolink.ConfigController",
                ID,
                from_api_url("https://siderolink.api/?jointoken=secret").unwrap(),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_peer_up() {
        let now = Utc::now();
        assert!(peer_up(Some(now - chrono::Duration::seconds(10)), now));
        assert!(!peer_up(Some(now - chrono::Duration::seconds(136)), now));
        assert!(!peer_up(None, now));
    }

    #[tokio::test]
    async fn test_status_follows_handshakes() {
        let state = setup();
        let device = StaticWireguardDevice::default();
        let mut controller = SiderolinkStatusController::new(Arc::new(device.clone()), Duration::from_secs(30));

        // no device yet
        controller.reconcile(&state).await.unwrap();
        let status = state.get::<SiderolinkStatus>(ID).unwrap().spec;
        assert_eq!(status.host, "siderolink.api");
        assert!(!status.connected);

        device.set_handshake(Some(Utc::now()));
        controller.reconcile(&state).await.unwrap();
        assert!(state.get::<SiderolinkStatus>(ID).unwrap().spec.connected);

        device.set_handshake(Some(Utc::now() - chrono::Duration::minutes(5)));
        controller.reconcile(&state).await.unwrap();
        assert!(!state.get::<SiderolinkStatus>(ID).unwrap().spec.connected);

        device.fail("permission denied");
        controller.reconcile(&state).await.unwrap();
        assert!(!state.get::<SiderolinkStatus>(ID).unwrap().spec.connected);
    }

    #[tokio::test]
    async fn test_removed_with_config() {
        let state = setup();
        let mut controller =
            SiderolinkStatusController::new(Arc::new(StaticWireguardDevice::default()), Duration::from_secs(30));
        controller.reconcile(&state).await.unwrap();

        let key = resources::ResourceKey::of::<SiderolinkConfig>(ID);
        state.teardown_and_destroy("siderolink.ConfigController", &key).unwrap();
        controller.reconcile(&state).await.unwrap();
        assert!(state.try_get::<SiderolinkStatus>(ID).unwrap().is_none());
        assert_eq!(controller.interval(), Some(Duration::from_secs(30)));
    }
}

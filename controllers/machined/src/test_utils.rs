//! Test utilities for unit testing controllers
//!
//! Recording implementations of the event and config sinks, in-memory
//! stand-ins for the cluster and WireGuard devices, configuration fixtures,
//! and a polling helper for asynchronous assertions.

#![cfg(test)]

use crate::error::ControllerError;
use crate::events::{ConfigSetter, EventPublisher, PlatformEvent, PlatformEventSink, RuntimeEvent};
use crate::kubernetes::{CsrLister, DistributedLock, EndpointSliceSink, EndpointSliceSpec};
use crate::wireguard::WireguardDevice;
use chrono::{DateTime, Utc};
use machineconfig::types::v1alpha1::Config;
use machineconfig::{Container, DocumentSpec};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Platform event sink remembering every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlatformEvents {
    events: Arc<Mutex<Vec<PlatformEvent>>>,
}

impl RecordingPlatformEvents {
    /// Events fired so far
    pub fn events(&self) -> Vec<PlatformEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PlatformEventSink for RecordingPlatformEvents {
    async fn fire(&self, event: PlatformEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Event publisher remembering every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingEvents {
    events: Arc<Mutex<Vec<RuntimeEvent>>>,
}

impl RecordingEvents {
    /// Events published so far
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingEvents {
    fn publish(&self, event: RuntimeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Config setter remembering every configuration.
#[derive(Debug, Clone, Default)]
pub struct RecordingConfigSetter {
    configs: Arc<Mutex<Vec<Container>>>,
}

impl RecordingConfigSetter {
    /// Configurations set so far
    pub fn configs(&self) -> Vec<Container> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ConfigSetter for RecordingConfigSetter {
    async fn set_config(&self, config: Container) -> Result<(), ControllerError> {
        self.configs.lock().unwrap().push(config);
        Ok(())
    }
}

/// A configuration complete for boot, for cluster `cluster-X`.
pub fn complete_config() -> Container {
    Container::from_legacy(Config::example())
}

/// Canonical bytes of [`complete_config`].
pub fn complete_config_bytes() -> Vec<u8> {
    complete_config().bytes().unwrap()
}

/// A configuration holding only the siderolink endpoint.
pub const SIDEROLINK_ONLY_CONFIG: &str = "apiVersion: v1alpha1
kind: SideroLinkConfig
apiUrl: https://siderolink.api/?jointoken=secret&user=alice
";

/// Polls `condition` every 10ms until it holds; panics after 5s.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// In-process lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryLock {
    holders: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryLock {
    /// Current holder of lock `name`.
    pub fn holder(&self, name: &str) -> Option<String> {
        self.holders.lock().unwrap().get(name).cloned()
    }

    /// Makes `holder` take lock `name` from outside.
    pub fn hold(&self, name: &str, holder: &str) {
        self.holders.lock().unwrap().insert(name.to_string(), holder.to_string());
    }
}

#[async_trait::async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, name: &str, holder: &str, _ttl: Duration) -> Result<bool, ControllerError> {
        let mut holders = self.holders.lock().unwrap();
        match holders.get(name) {
            Some(current) if current != holder => Ok(false),
            _ => {
                holders.insert(name.to_string(), holder.to_string());
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), ControllerError> {
        let mut holders = self.holders.lock().unwrap();
        if holders.get(name).is_some_and(|current| current == holder) {
            holders.remove(name);
        }
        Ok(())
    }
}

/// Endpoint slice sink keeping slices in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingEndpointSlices {
    slices: Arc<Mutex<BTreeMap<String, EndpointSliceSpec>>>,
    writes: Arc<Mutex<usize>>,
}

impl RecordingEndpointSlices {
    /// Slices currently published
    pub fn slices(&self) -> BTreeMap<String, EndpointSliceSpec> {
        self.slices.lock().unwrap().clone()
    }

    /// Number of apply and delete calls so far
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl EndpointSliceSink for RecordingEndpointSlices {
    async fn apply(&self, slice: &EndpointSliceSpec) -> Result<(), ControllerError> {
        *self.writes.lock().unwrap() += 1;
        self.slices.lock().unwrap().insert(slice.name.clone(), slice.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ControllerError> {
        *self.writes.lock().unwrap() += 1;
        self.slices.lock().unwrap().remove(name);
        Ok(())
    }
}

/// CSR lister returning a fixed set of pending CSRs per node.
#[derive(Debug, Clone, Default)]
pub struct StaticCsrs {
    pending: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
}

impl StaticCsrs {
    /// Sets the pending CSRs of `node`.
    pub fn set(&self, node: &str, csrs: &[&str]) {
        self.pending
            .lock()
            .unwrap()
            .insert(node.to_string(), csrs.iter().map(|c| c.to_string()).collect());
    }
}

#[async_trait::async_trait]
impl CsrLister for StaticCsrs {
    async fn pending_serving_csrs(&self, node_name: &str) -> Result<Vec<String>, ControllerError> {
        Ok(self.pending.lock().unwrap().get(node_name).cloned().unwrap_or_default())
    }
}

/// WireGuard device reporting a fixed handshake time, or failing.
#[derive(Debug, Clone, Default)]
pub struct StaticWireguardDevice {
    handshake: Arc<Mutex<Option<DateTime<Utc>>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl StaticWireguardDevice {
    /// Sets the last handshake; `None` means no device.
    pub fn set_handshake(&self, handshake: Option<DateTime<Utc>>) {
        *self.handshake.lock().unwrap() = handshake;
    }

    /// Fails every following probe.
    pub fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait::async_trait]
impl WireguardDevice for StaticWireguardDevice {
    async fn last_handshake(&self, _link: &str) -> Result<Option<DateTime<Utc>>, ControllerError> {
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(ControllerError::Wireguard(message));
        }
        Ok(*self.handshake.lock().unwrap())
    }
}

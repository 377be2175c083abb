//! Events emitted while acquiring the configuration, and the sink the
//! acquired configuration is handed to.

use crate::error::ControllerError;
use machineconfig::Container;
use resources::State;
use resources::config::{MachineConfig, PERSISTENT_ID, V1ALPHA1_ID};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Kind of a platform event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEventType {
    /// The node waits for operator input
    Activate,
    /// A configuration was loaded
    ConfigLoaded,
    /// Acquisition failed
    Failure,
}

/// Event reported to the platform the node runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEvent {
    /// Kind
    pub kind: PlatformEventType,
    /// Human-readable message
    pub message: String,
    /// Error, for failures
    pub error: Option<String>,
}

impl PlatformEvent {
    /// Event of `kind` with `message`.
    pub fn new(kind: PlatformEventType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error: None,
        }
    }

    /// Attach an error.
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Receives platform events.
#[async_trait::async_trait]
pub trait PlatformEventSink: Send + Sync {
    /// Deliver `event`; delivery is best effort.
    async fn fire(&self, event: PlatformEvent);
}

/// Platform event sink writing to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlatformEvents;

#[async_trait::async_trait]
impl PlatformEventSink for LogPlatformEvents {
    async fn fire(&self, event: PlatformEvent) {
        match &event.error {
            Some(error) => error!("Platform event {:?}: {}: {}", event.kind, event.message, error),
            None => info!("Platform event {:?}: {}", event.kind, event.message),
        }
    }
}

/// Progress of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Task started
    Start,
    /// Task finished
    Stop,
}

/// Task name of maintenance mode.
pub const MAINTENANCE_TASK: &str = "runningMaintenance";

/// Event published to API clients of the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Task progress
    Task {
        /// Task name
        task: String,
        /// Progress
        action: TaskAction,
    },
    /// Loading the configuration failed
    ConfigLoadError {
        /// Error message
        error: String,
    },
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEvent::Task { task, action } => {
                let action = match action {
                    TaskAction::Start => "START",
                    TaskAction::Stop => "STOP",
                };
                write!(f, "{}:{}", task, action)
            }
            RuntimeEvent::ConfigLoadError { error } => write!(f, "ConfigLoadError: {}", error),
        }
    }
}

/// Publishes runtime events.
pub trait EventPublisher: Send + Sync {
    /// Publish `event`.
    fn publish(&self, event: RuntimeEvent);
}

/// Runtime events fanned out over a broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }
}

impl EventBus {
    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: RuntimeEvent) {
        debug!("Runtime event {}", event);
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

/// Receives every configuration the acquisition produces.
#[async_trait::async_trait]
pub trait ConfigSetter: Send + Sync {
    /// Make `config` the active configuration.
    async fn set_config(&self, config: Container) -> Result<(), ControllerError>;
}

/// Owner of the active configuration resources.
pub const CONFIG_SETTER_OWNER: &str = "config.Setter";

/// Publishes the configuration as the active and persistent `MachineConfig`.
#[derive(Debug, Clone)]
pub struct StateConfigSetter {
    state: State,
}

impl StateConfigSetter {
    /// Setter writing to `state`.
    pub fn new(state: State) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl ConfigSetter for StateConfigSetter {
    async fn set_config(&self, config: Container) -> Result<(), ControllerError> {
        let resource = MachineConfig::new(config);
        self.state.modify(CONFIG_SETTER_OWNER, V1ALPHA1_ID, resource.clone())?;
        self.state.modify(CONFIG_SETTER_OWNER, PERSISTENT_ID, resource)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machineconfig::types::v1alpha1::Config;
    use machineconfig::DocumentSpec;

    #[test]
    fn test_runtime_event_display() {
        let start = RuntimeEvent::Task {
            task: MAINTENANCE_TASK.to_string(),
            action: TaskAction::Start,
        };
        assert_eq!(start.to_string(), "runningMaintenance:START");
    }

    #[tokio::test]
    async fn test_event_bus_delivers() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        bus.publish(RuntimeEvent::ConfigLoadError { error: "x".to_string() });
        assert_eq!(events.recv().await.unwrap(), RuntimeEvent::ConfigLoadError { error: "x".to_string() });
    }

    #[tokio::test]
    async fn test_state_config_setter() {
        let state = State::new();
        let setter = StateConfigSetter::new(state.clone());
        setter.set_config(Container::from_legacy(Config::example())).await.unwrap();

        let active = state.get::<MachineConfig>(V1ALPHA1_ID).unwrap();
        assert_eq!(active.spec.container().cluster_name(), Some("cluster-X"));
        assert!(state.get::<MachineConfig>(PERSISTENT_ID).is_ok());

        // Same configuration again does not bump the version.
        setter.set_config(Container::from_legacy(Config::example())).await.unwrap();
        assert_eq!(state.get::<MachineConfig>(V1ALPHA1_ID).unwrap().version(), 1);
    }
}

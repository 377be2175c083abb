//! Configuration acquisition.
//!
//! Once `AcquireConfigSpec` appears, the controller looks for a machine
//! configuration in order: the state partition, the platform, and finally
//! maintenance mode, where an operator submits one. Every configuration found
//! along the way (complete or not) is handed to the [`ConfigSetter`].
//!
//! ```text
//! Disk ──(no cfg)──► Platform ──(incomplete|none)──► MaintenanceEnter ──► Maintenance
//!  │                   │                                                    │
//!  │(complete)         │(complete)                                          │(complete)
//!  ▼                   ▼                                                    ▼
//! Done ◄───────────────────────────────────────────── MaintenanceLeave ◄─────┘
//!  │
//!  ▼
//! Final
//! ```
//!
//! A failure in any step is published as a `ConfigLoadError` event and a
//! `Failure` platform event, then returned; the runtime restarts acquisition
//! from the beginning after a backoff.

use crate::error::ControllerError;
use crate::events::{
    ConfigSetter, EventPublisher, MAINTENANCE_TASK, PlatformEvent, PlatformEventSink, PlatformEventType,
    RuntimeEvent, TaskAction,
};
use crate::runtime::{Controller, ControllerContext, Input, Wake, wait_for_change};
use machineconfig::{Container, ValidationMode, loader};
use platform::PlatformConfigurator;
use resources::config::{ACQUIRE_ID, AcquireConfigSpec, AcquireConfigStatus, MAINTENANCE_ID, MachineConfig};
use resources::runtime::{MAINTENANCE_SERVICE_ID, MaintenanceServiceRequest};
use resources::{ResourceKey, State};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Owner of the resources written during acquisition.
pub const ACQUIRE_OWNER: &str = "config.AcquireController";

/// Source trail entry of the state partition.
pub const SOURCE_STATE: &str = "state";

/// Source trail entry of maintenance mode.
pub const SOURCE_MAINTENANCE: &str = "maintenance";

/// Message of the failure platform event.
pub const FAILURE_MESSAGE: &str = "Error loading and validating Talos machine config.";

/// Acquisition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    /// Read the state partition
    Disk,
    /// Fetch from the platform
    Platform,
    /// Request maintenance mode
    MaintenanceEnter,
    /// Wait for an operator-submitted configuration
    Maintenance,
    /// Leave maintenance mode
    MaintenanceLeave,
    /// Report success
    Done,
    /// Idle
    Final,
}

/// Outcome of one step.
#[derive(Debug, Default)]
pub struct Transition {
    /// Next step; `None` waits for the next change and repeats the step
    pub next: Option<AcquireState>,
    /// Configuration produced by the step
    pub config: Option<Container>,
    /// Where the configuration came from
    pub source: Option<String>,
}

impl Transition {
    /// Move to `next`.
    pub fn to(next: AcquireState) -> Self {
        Self {
            next: Some(next),
            ..Self::default()
        }
    }

    /// Repeat the step on the next change.
    pub fn stay() -> Self {
        Self::default()
    }

    /// Attach the configuration produced by the step.
    pub fn with_config(mut self, config: Container, source: impl Into<String>) -> Self {
        self.config = Some(config);
        self.source = Some(source.into());
        self
    }
}

/// Acquires the machine configuration.
pub struct AcquireController {
    platform: Arc<dyn PlatformConfigurator>,
    platform_events: Arc<dyn PlatformEventSink>,
    events: Arc<dyn EventPublisher>,
    setter: Arc<dyn ConfigSetter>,
    state_path: PathBuf,
    mode: ValidationMode,
    source_trail: Vec<String>,
    maintenance_version: u64,
}

impl std::fmt::Debug for AcquireController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireController")
            .field("platform", &self.platform.name())
            .field("state_path", &self.state_path)
            .field("mode", &self.mode)
            .field("source_trail", &self.source_trail)
            .finish()
    }
}

impl AcquireController {
    /// Controller reading the persisted configuration from `state_path` and
    /// validating platform configurations in `mode`.
    pub fn new(
        platform: Arc<dyn PlatformConfigurator>,
        platform_events: Arc<dyn PlatformEventSink>,
        events: Arc<dyn EventPublisher>,
        setter: Arc<dyn ConfigSetter>,
        state_path: impl Into<PathBuf>,
        mode: ValidationMode,
    ) -> Self {
        Self {
            platform,
            platform_events,
            events,
            setter,
            state_path: state_path.into(),
            mode,
            source_trail: Vec::new(),
            maintenance_version: 0,
        }
    }

    /// Sources that contributed a configuration during the last run.
    pub fn source_trail(&self) -> &[String] {
        &self.source_trail
    }

    /// Run one step.
    pub async fn step(&mut self, state: &State, current: AcquireState) -> Result<Transition, ControllerError> {
        match current {
            AcquireState::Disk => self.disk().await,
            AcquireState::Platform => self.platform().await,
            AcquireState::MaintenanceEnter => self.maintenance_enter(state).await,
            AcquireState::Maintenance => self.maintenance(state),
            AcquireState::MaintenanceLeave => self.maintenance_leave(state),
            AcquireState::Done => self.done(state).await,
            AcquireState::Final => Ok(Transition::stay()),
        }
    }

    async fn disk(&mut self) -> Result<Transition, ControllerError> {
        let bytes = match tokio::fs::read(&self.state_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config on the state partition at {}", self.state_path.display());
                return Ok(Transition::to(AcquireState::Platform));
            }
            Err(e) => return Err(e.into()),
        };

        let config = loader::load_from_bytes(bytes)
            .map_err(|e| ControllerError::Acquire(format!("failed to load config from STATE: {}", e)))?;
        for warning in config
            .validate(&ValidationMode::disk())
            .map_err(|e| ControllerError::Acquire(format!("failed to validate config from STATE: {}", e)))?
        {
            warn!("Config from STATE: {}", warning);
        }

        let next = if config.is_complete_for_boot() {
            AcquireState::Done
        } else {
            info!("Config from STATE is incomplete, entering maintenance mode");
            AcquireState::MaintenanceEnter
        };
        Ok(Transition::to(next).with_config(config, SOURCE_STATE))
    }

    async fn platform(&mut self) -> Result<Transition, ControllerError> {
        let name = self.platform.name().to_string();
        let bytes = match self.platform.configuration().await {
            Ok(bytes) => bytes,
            Err(e) if e.is_no_config_source() => {
                info!("Platform {} has no config, entering maintenance mode", name);
                return Ok(Transition::to(AcquireState::MaintenanceEnter));
            }
            Err(e) => {
                return Err(ControllerError::Acquire(format!(
                    "error acquiring via platform {}: {}",
                    name, e
                )));
            }
        };

        let config = loader::maybe_decompress(bytes)
            .and_then(loader::load_from_bytes)
            .map_err(|e| ControllerError::Acquire(format!("failed to load config via platform {}: {}", name, e)))?;
        for warning in config.validate(&self.mode).map_err(|e| {
            ControllerError::Acquire(format!("failed to validate config acquired via platform {}: {}", name, e))
        })? {
            warn!("Config from platform {}: {}", name, warning);
        }

        let next = if config.is_complete_for_boot() {
            AcquireState::Done
        } else {
            info!("Config from platform {} is incomplete, entering maintenance mode", name);
            AcquireState::MaintenanceEnter
        };
        Ok(Transition::to(next).with_config(config, name))
    }

    async fn maintenance_enter(&mut self, state: &State) -> Result<Transition, ControllerError> {
        self.platform_events
            .fire(PlatformEvent::new(
                PlatformEventType::Activate,
                "Talos booted into maintenance mode. Ready for user interaction.",
            ))
            .await;
        self.events.publish(RuntimeEvent::Task {
            task: MAINTENANCE_TASK.to_string(),
            action: TaskAction::Start,
        });
        state.modify(ACQUIRE_OWNER, MAINTENANCE_SERVICE_ID, MaintenanceServiceRequest)?;

        Ok(Transition::to(AcquireState::Maintenance))
    }

    fn maintenance(&mut self, state: &State) -> Result<Transition, ControllerError> {
        let Some(submitted) = state.try_get::<MachineConfig>(MAINTENANCE_ID)? else {
            return Ok(Transition::stay());
        };
        if submitted.version() <= self.maintenance_version {
            return Ok(Transition::stay());
        }
        self.maintenance_version = submitted.version();

        let config = submitted.spec.into_container();
        if config.is_complete_for_boot() {
            Ok(Transition::to(AcquireState::MaintenanceLeave).with_config(config, SOURCE_MAINTENANCE))
        } else {
            info!("Config submitted in maintenance mode is incomplete, waiting for more");
            Ok(Transition::stay().with_config(config, SOURCE_MAINTENANCE))
        }
    }

    fn maintenance_leave(&mut self, state: &State) -> Result<Transition, ControllerError> {
        let key = ResourceKey::of::<MaintenanceServiceRequest>(MAINTENANCE_SERVICE_ID);
        if !state.teardown_and_destroy(ACQUIRE_OWNER, &key)? {
            // The maintenance service still holds the request.
            return Ok(Transition::stay());
        }
        self.events.publish(RuntimeEvent::Task {
            task: MAINTENANCE_TASK.to_string(),
            action: TaskAction::Stop,
        });

        Ok(Transition::to(AcquireState::Done))
    }

    async fn done(&mut self, state: &State) -> Result<Transition, ControllerError> {
        state.modify(ACQUIRE_OWNER, ACQUIRE_ID, AcquireConfigStatus)?;
        self.platform_events
            .fire(PlatformEvent::new(
                PlatformEventType::ConfigLoaded,
                "Talos machine config loaded successfully.",
            ))
            .await;
        info!("Config source trail: {:?}", self.source_trail);

        Ok(Transition::to(AcquireState::Final))
    }

    async fn report_failure(&self, error: &ControllerError) {
        self.events.publish(RuntimeEvent::ConfigLoadError {
            error: error.to_string(),
        });
        self.platform_events
            .fire(PlatformEvent::new(PlatformEventType::Failure, FAILURE_MESSAGE).with_error(error))
            .await;
    }

    async fn apply(&mut self, transition: &mut Transition) -> Result<(), ControllerError> {
        if let Some(config) = transition.config.take() {
            if let Some(source) = transition.source.take() {
                self.source_trail.push(source);
            }
            self.setter.set_config(config).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Controller for AcquireController {
    fn name(&self) -> &'static str {
        ACQUIRE_OWNER
    }

    async fn run(&mut self, ctx: &ControllerContext) -> Result<(), ControllerError> {
        self.source_trail.clear();
        self.maintenance_version = 0;
        let mut events = ctx.state.watch();

        while ctx.state.try_get::<AcquireConfigSpec>(ACQUIRE_ID)?.is_none() {
            let inputs = [Input::of::<AcquireConfigSpec>()];
            if wait_for_change(&mut events, &inputs, None, &ctx.cancel).await == Wake::Cancelled {
                return Ok(());
            }
        }

        let mut current = AcquireState::Disk;
        loop {
            if current == AcquireState::Final {
                ctx.cancel.cancelled().await;
                return Ok(());
            }

            let result = match self.step(&ctx.state, current).await {
                Ok(mut transition) => self.apply(&mut transition).await.map(|()| transition.next),
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(next)) => {
                    info!("Acquire: {:?} -> {:?}", current, next);
                    current = next;
                }
                Ok(None) => {
                    let inputs = [Input::of::<MachineConfig>(), Input::of::<MaintenanceServiceRequest>()];
                    if wait_for_change(&mut events, &inputs, None, &ctx.cancel).await == Wake::Cancelled {
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.report_failure(&e).await;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "acquire_test.rs"]
mod acquire_test;

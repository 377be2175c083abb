//! Controller runtime.
//!
//! Every controller runs on its own task. A controller returning an error is
//! restarted after a Fibonacci backoff; one returning `Ok` is done. Cancelling
//! the runtime token stops every controller, and [`ControllerRuntime::run`]
//! joins them before returning.
//!
//! Derivation controllers implement [`Reconcile`] instead: a single pass
//! mapping inputs to outputs, re-run whenever one of the declared inputs
//! changes (and, optionally, on a fixed interval).

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use resources::{Event, ResourceSpec, State};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What a controller gets to work with.
#[derive(Debug, Clone)]
pub struct ControllerContext {
    /// Shared resource state
    pub state: State,
    /// Cancelled on shutdown
    pub cancel: CancellationToken,
}

impl ControllerContext {
    /// Context over `state` with a fresh cancellation token.
    pub fn new(state: State) -> Self {
        Self {
            state,
            cancel: CancellationToken::new(),
        }
    }
}

/// A long-running controller.
#[async_trait::async_trait]
pub trait Controller: Send {
    /// Name used as resource owner and in logs.
    fn name(&self) -> &'static str;

    /// Run until cancelled or failed.
    async fn run(&mut self, ctx: &ControllerContext) -> Result<(), ControllerError>;
}

/// A resource type a controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    resource_type: &'static str,
    namespace: &'static str,
}

impl Input {
    /// Input on every `T`.
    pub fn of<T: ResourceSpec>() -> Self {
        Self {
            resource_type: T::TYPE,
            namespace: T::NAMESPACE,
        }
    }

    /// Whether `event` concerns this input.
    pub fn matches(&self, event: &Event) -> bool {
        event.key.resource_type == self.resource_type && event.key.namespace == self.namespace
    }
}

/// Why [`wait_for_change`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// An input changed, or events were missed
    Changed,
    /// The interval elapsed
    Tick,
    /// The controller is shutting down
    Cancelled,
}

/// Waits until an event matching `inputs` arrives, `interval` elapses, or
/// `cancel` fires.
pub async fn wait_for_change(
    events: &mut Receiver<Event>,
    inputs: &[Input],
    interval: Option<Duration>,
    cancel: &CancellationToken,
) -> Wake {
    let tick = async {
        match interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(tick);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Wake::Cancelled,
            _ = &mut tick => return Wake::Tick,
            received = events.recv() => match received {
                Ok(event) if inputs.iter().any(|input| input.matches(&event)) => return Wake::Changed,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    debug!("Missed {} events, reconciling", missed);
                    return Wake::Changed;
                }
                Err(RecvError::Closed) => return Wake::Cancelled,
            },
        }
    }
}

/// A derivation controller: one idempotent pass from inputs to outputs.
#[async_trait::async_trait]
pub trait Reconcile: Send {
    /// Name used as resource owner and in logs.
    fn name(&self) -> &'static str;

    /// Resource types whose changes trigger a pass.
    fn inputs(&self) -> Vec<Input>;

    /// Also run a pass this often.
    fn interval(&self) -> Option<Duration> {
        None
    }

    /// Run one pass.
    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError>;
}

/// Runs a [`Reconcile`] as a [`Controller`].
#[derive(Debug)]
pub struct Reconciling<R>(pub R);

#[async_trait::async_trait]
impl<R: Reconcile> Controller for Reconciling<R> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    async fn run(&mut self, ctx: &ControllerContext) -> Result<(), ControllerError> {
        let inputs = self.0.inputs();
        let interval = self.0.interval();
        // Subscribe before the first pass so no change slips between them.
        let mut events = ctx.state.watch();

        loop {
            self.0.reconcile(&ctx.state).await?;

            if wait_for_change(&mut events, &inputs, interval, &ctx.cancel).await == Wake::Cancelled {
                return Ok(());
            }
        }
    }
}

/// A controller failing after running this long restarts from the shortest
/// backoff.
pub const HEALTHY_RUN: Duration = Duration::from_secs(60);

/// Spawns controllers and restarts them on failure.
pub struct ControllerRuntime {
    ctx: ControllerContext,
    controllers: Vec<Box<dyn Controller>>,
}

impl std::fmt::Debug for ControllerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRuntime")
            .field("controllers", &self.controllers.iter().map(|c| c.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ControllerRuntime {
    /// Runtime over `state`.
    pub fn new(state: State) -> Self {
        Self {
            ctx: ControllerContext::new(state),
            controllers: Vec::new(),
        }
    }

    /// Token cancelling every controller.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Shared resource state.
    pub fn state(&self) -> &State {
        &self.ctx.state
    }

    /// Register a controller.
    pub fn register(&mut self, controller: impl Controller + 'static) -> &mut Self {
        self.controllers.push(Box::new(controller));
        self
    }

    /// Register a derivation controller.
    pub fn register_reconciler(&mut self, reconciler: impl Reconcile + 'static) -> &mut Self {
        self.register(Reconciling(reconciler))
    }

    /// Run every controller until cancellation, then join them.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut tasks = JoinSet::new();

        for controller in self.controllers {
            let ctx = self.ctx.clone();
            let span = info_span!("controller", name = controller.name());
            tasks.spawn(supervise(controller, ctx).instrument(span));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Controller task panicked: {}", e);
                self.ctx.cancel.cancel();
                tasks.shutdown().await;
                return Err(e.into());
            }
        }

        Ok(())
    }
}

async fn supervise(mut controller: Box<dyn Controller>, ctx: ControllerContext) {
    let mut backoff = FibonacciBackoff::default();
    info!("Starting controller {}", controller.name());

    loop {
        let started = tokio::time::Instant::now();
        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = controller.run(&ctx) => result,
        };

        match result {
            Ok(()) => break,
            Err(e) => {
                if started.elapsed() >= HEALTHY_RUN {
                    backoff.reset();
                }
                let delay = backoff.next_backoff();
                warn!("Controller {} failed, restarting in {:?}: {}", controller.name(), delay, e);
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("Controller {} stopped", controller.name());
}

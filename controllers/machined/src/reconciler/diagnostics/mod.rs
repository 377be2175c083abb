//! Operator-facing warnings.
//!
//! Each check looks at current resources and either reports a problem or
//! nothing. A problem is published as a `Diagnostic` only once the same
//! check has kept reporting it for its hysteresis window, so transient
//! states during boot stay quiet. A check that stops firing clears its
//! warning on the next pass.

pub mod address_overlap;
pub mod kubelet_csr;

use crate::error::ControllerError;
use crate::reconcile_helpers::Outputs;
use crate::runtime::{Input, Reconcile};
use async_trait::async_trait;
use resources::State;
use resources::runtime::Diagnostic;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Owner of the diagnostics.
pub const DIAGNOSTICS_OWNER: &str = "runtime.DiagnosticsController";

/// How often checks are re-run without input changes.
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(10);

/// A named health check.
#[async_trait]
pub trait DiagnosticCheck: Send + Sync {
    /// ID of the published diagnostic.
    fn id(&self) -> &'static str;

    /// Resource types the check reads.
    fn inputs(&self) -> Vec<Input>;

    /// How long the check must keep firing before it is published.
    fn hysteresis(&self) -> Duration;

    /// Run the check.
    async fn check(&self, state: &State) -> Result<Option<Diagnostic>, ControllerError>;
}

/// Runs every check and publishes the ones that keep firing.
pub struct DiagnosticsController {
    checks: Vec<Box<dyn DiagnosticCheck>>,
    firing_since: HashMap<&'static str, Instant>,
}

impl std::fmt::Debug for DiagnosticsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsController")
            .field("checks", &self.checks.iter().map(|c| c.id()).collect::<Vec<_>>())
            .field("firing_since", &self.firing_since)
            .finish()
    }
}

impl DiagnosticsController {
    /// Controller running `checks`.
    pub fn new(checks: Vec<Box<dyn DiagnosticCheck>>) -> Self {
        Self {
            checks,
            firing_since: HashMap::new(),
        }
    }
}

#[async_trait]
impl Reconcile for DiagnosticsController {
    fn name(&self) -> &'static str {
        DIAGNOSTICS_OWNER
    }

    fn inputs(&self) -> Vec<Input> {
        let mut inputs: Vec<Input> = Vec::new();
        for input in self.checks.iter().flat_map(|check| check.inputs()) {
            if !inputs.contains(&input) {
                inputs.push(input);
            }
        }
        inputs
    }

    fn interval(&self) -> Option<Duration> {
        Some(RECHECK_INTERVAL)
    }

    async fn reconcile(&mut self, state: &State) -> Result<(), ControllerError> {
        let mut outputs = Outputs::new(state, DIAGNOSTICS_OWNER);
        let now = Instant::now();

        for check in &self.checks {
            let id = check.id();
            match check.check(state).await {
                Ok(Some(diagnostic)) => {
                    let since = *self.firing_since.entry(id).or_insert(now);
                    if now.duration_since(since) >= check.hysteresis() {
                        outputs.modify(id, diagnostic)?;
                    } else {
                        debug!("Check {} is firing, waiting out its hysteresis", id);
                    }
                }
                Ok(None) => {
                    self.firing_since.remove(id);
                }
                Err(e) => {
                    warn!("Check {} failed: {}", id, e);
                    outputs.keep::<Diagnostic>(id);
                }
            }
        }

        outputs.cleanup::<Diagnostic>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Check answering whatever the test sets.
    #[derive(Debug, Clone)]
    struct ScriptedCheck {
        answer: Arc<Mutex<Result<Option<Diagnostic>, String>>>,
    }

    impl Default for ScriptedCheck {
        fn default() -> Self {
            Self {
                answer: Arc::new(Mutex::new(Ok(None))),
            }
        }
    }

    impl ScriptedCheck {
        fn set(&self, answer: Result<Option<&str>, &str>) {
            *self.answer.lock().unwrap() = answer
                .map(|message| {
                    message.map(|m| Diagnostic {
                        message: m.to_string(),
                        details: Vec::new(),
                    })
                })
                .map_err(str::to_string);
        }
    }

    #[async_trait]
    impl DiagnosticCheck for ScriptedCheck {
        fn id(&self) -> &'static str {
            "scripted"
        }

        fn inputs(&self) -> Vec<Input> {
            vec![Input::of::<Diagnostic>()]
        }

        fn hysteresis(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn check(&self, _state: &State) -> Result<Option<Diagnostic>, ControllerError> {
            self.answer
                .lock()
                .unwrap()
                .clone()
                .map_err(ControllerError::Reconciliation)
        }
    }

    fn published(state: &State) -> Option<String> {
        state
            .try_get::<Diagnostic>("scripted")
            .unwrap()
            .map(|d| d.spec.message)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hysteresis() {
        let state = State::new();
        let check = ScriptedCheck::default();
        let mut controller = DiagnosticsController::new(vec![Box::new(check.clone())]);

        check.set(Ok(Some("broken")));
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state), None);

        tokio::time::advance(Duration::from_secs(30)).await;
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state), None);

        tokio::time::advance(Duration::from_secs(30)).await;
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state).as_deref(), Some("broken"));

        // a failing check keeps the warning
        check.set(Err("probe failed"));
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state).as_deref(), Some("broken"));

        check.set(Ok(None));
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruption_restarts_window() {
        let state = State::new();
        let check = ScriptedCheck::default();
        let mut controller = DiagnosticsController::new(vec![Box::new(check.clone())]);

        check.set(Ok(Some("broken")));
        controller.reconcile(&state).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;

        check.set(Ok(None));
        controller.reconcile(&state).await.unwrap();

        check.set(Ok(Some("broken")));
        controller.reconcile(&state).await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        controller.reconcile(&state).await.unwrap();
        assert_eq!(published(&state), None);
    }

    #[test]
    fn test_inputs_are_merged() {
        let controller = DiagnosticsController::new(vec![
            Box::new(ScriptedCheck::default()),
            Box::new(ScriptedCheck::default()),
        ]);
        assert_eq!(controller.inputs(), vec![Input::of::<Diagnostic>()]);
    }
}

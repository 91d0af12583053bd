//! The build pipeline: an ordered list of steps over a shared [`BuildState`].
//!
//! The [`Runner`] executes steps strictly in order. When a step fails it
//! records the failure, stops, and unwinds every completed step in reverse.
//! Cleanup failures are reported as warnings and never replace the original
//! error or stop the remaining unwinds.

pub mod cidr;
pub mod fallback;
pub mod lifecycle;
pub mod progress;
pub mod state;
pub mod steps;
pub mod zones;

pub use lifecycle::Lifecycle;
pub use progress::{LogReporter, NullReporter, ProgressReporter};
pub use state::BuildState;

use crate::error::BuildError;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// One unit of provisioning work
#[async_trait]
pub trait Step: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire or create the step's resource and publish it to `state`
    ///
    /// On error the step has already released anything it created during
    /// this call.
    async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError>;

    /// Release the step's resource if the step created it
    ///
    /// Idempotent; a no-op for reused resources and for steps that never
    /// completed.
    async fn cleanup(&mut self, state: &mut BuildState) -> Result<(), BuildError>;
}

/// Executes steps in order and unwinds completed ones in reverse
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    /// Steps `0..completed` finished `run` and have not been unwound
    completed: usize,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            completed: 0,
        }
    }

    /// Names of steps that completed and are awaiting cleanup
    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.steps[..self.completed]
            .iter()
            .map(|s| s.name())
            .collect()
    }

    /// Run steps forward until one fails
    ///
    /// On failure the error is recorded in `state`, the completed steps are
    /// unwound, and the error is returned. On success the completed steps are
    /// left for [`Runner::cleanup`].
    pub async fn execute(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        while self.completed < self.steps.len() {
            let step = &mut self.steps[self.completed];
            let name = step.name();

            let result = if state.cancel.is_cancelled() {
                Err(BuildError::Cancelled)
            } else {
                debug!(step = name, "Running step");
                step.run(state).await
            };

            match result {
                Ok(()) => self.completed += 1,
                Err(e) => {
                    if e.is_sentinel() {
                        info!(step = name, "{e}");
                    } else {
                        warn!(step = name, error = %e, "Step failed, unwinding");
                        state.reporter.error(&e.to_string());
                    }
                    state.record_failure(&e);
                    self.cleanup(state).await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Unwind completed steps in reverse order
    ///
    /// Safe to call more than once; each step is unwound at most once.
    pub async fn cleanup(&mut self, state: &mut BuildState) {
        while self.completed > 0 {
            self.completed -= 1;
            let step = &mut self.steps[self.completed];
            debug!(step = step.name(), "Cleaning up step");
            if let Err(e) = step.cleanup(state).await {
                warn!(step = step.name(), error = %e, "Cleanup failed");
                state
                    .reporter
                    .error(&format!("Cleanup of {} failed: {e}", step.name()));
            }
        }
    }

    /// Execute, then always clean up
    pub async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let result = self.execute(state).await;
        self.cleanup(state).await;
        result
    }
}

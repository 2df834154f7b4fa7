//! Step trait for pipeline execution.

use super::state::BuildState;
use async_trait::async_trait;

/// What the runner should do after a step's run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Proceed to the next step. Also returned by steps that skip themselves.
    Continue,
    /// Stop the pipeline. The step records the reason in [`BuildState`].
    Halt,
}

/// A unit of provisioning work.
///
/// Implement this trait to add a step to a build. Steps read their inputs
/// from their own fields and from the shared [`BuildState`], and must be safe
/// to re-run against a VM a previous build left half-provisioned.
#[async_trait]
pub trait Step: Send + Sync {
    /// Execute the step.
    async fn run(&self, state: &mut BuildState) -> StepAction;

    /// Release whatever `run` allocated. Called by the runner for every step
    /// whose `run` was invoked, whether or not the pipeline succeeded.
    async fn cleanup(&self, _state: &mut BuildState) {}

    /// Get human-readable step name for logging.
    fn name(&self) -> &str;
}

pub type BoxedStep = Box<dyn Step>;

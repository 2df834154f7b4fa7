//! Pipeline runner.
//!
//! Runs steps in order against one build state, stops at the first halt
//! (or at cancellation between steps), then unwinds through the cleanup
//! phase of every step that ran.

use super::metrics::{PipelineMetrics, StepMetrics};
use super::state::BuildState;
use super::step::{BoxedStep, StepAction};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use vmprov_shared::{VmprovError, VmprovResult};

pub struct Pipeline {
    steps: Vec<BoxedStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<BoxedStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// `Halt` if a step halted or the run was cancelled.
    pub action: StepAction,
    pub metrics: PipelineMetrics,
}

impl PipelineReport {
    /// Turn a halted run into the error recorded in `state`.
    pub fn into_result(self, state: &mut BuildState) -> VmprovResult<PipelineMetrics> {
        if self.action == StepAction::Continue {
            return Ok(self.metrics);
        }
        if let Some(err) = state.take_error() {
            return Err(err);
        }
        if state.is_cancelled() {
            return Err(VmprovError::Cancelled);
        }
        Err(VmprovError::Internal(
            "pipeline halted without recording an error".into(),
        ))
    }
}

/// Pipeline runner.
///
/// This provides the generic infrastructure for executing a build.
/// The actual provisioning logic is provided by step implementations.
pub struct PipelineRunner;

impl PipelineRunner {
    /// Run a pipeline.
    ///
    /// This is the core execution loop. Cleanup runs for every step whose
    /// `run` was invoked, last step first, including the step that halted.
    pub async fn run(
        pipeline: Pipeline,
        state: &mut BuildState,
        cancel: &CancellationToken,
    ) -> PipelineReport {
        let total_start = Instant::now();
        let mut step_metrics = Vec::with_capacity(pipeline.len());
        let mut ran = 0;
        let mut action = StepAction::Continue;

        for step in &pipeline.steps {
            if cancel.is_cancelled() {
                tracing::warn!(step = step.name(), "Pipeline cancelled before step");
                state.cancelled = true;
                action = StepAction::Halt;
                break;
            }

            let name = step.name().to_string();
            let step_start = Instant::now();
            tracing::debug!(step = %name, "Running step");

            let step_action = step.run(state).await;
            ran += 1;

            step_metrics.push(StepMetrics {
                name: name.clone(),
                action: step_action,
                duration_ms: step_start.elapsed().as_millis(),
            });

            if step_action == StepAction::Halt {
                tracing::warn!(step = %name, "Step halted pipeline");
                state.halted = true;
                action = StepAction::Halt;
                break;
            }
        }

        for step in pipeline.steps[..ran].iter().rev() {
            tracing::trace!(step = step.name(), "Cleaning up step");
            step.cleanup(state).await;
        }

        PipelineReport {
            action,
            metrics: PipelineMetrics {
                total_duration_ms: total_start.elapsed().as_millis(),
                steps: step_metrics,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Step;
    use crate::ui::testing::RecordingUi;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct FakeStep {
        name: &'static str,
        action: StepAction,
        journal: Journal,
        cancel_after: Option<CancellationToken>,
    }

    impl FakeStep {
        fn boxed(name: &'static str, action: StepAction, journal: &Journal) -> BoxedStep {
            Box::new(Self {
                name,
                action,
                journal: journal.clone(),
                cancel_after: None,
            })
        }
    }

    #[async_trait]
    impl Step for FakeStep {
        async fn run(&self, state: &mut BuildState) -> StepAction {
            self.journal.lock().push(format!("run:{}", self.name));
            if self.action == StepAction::Halt {
                state.put_error(VmprovError::Driver(format!("{} failed", self.name)));
            }
            if let Some(token) = &self.cancel_after {
                token.cancel();
            }
            self.action
        }

        async fn cleanup(&self, _state: &mut BuildState) {
            self.journal.lock().push(format!("cleanup:{}", self.name));
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn new_state() -> BuildState {
        BuildState::new(Arc::new(RecordingUi::default()))
    }

    #[tokio::test]
    async fn test_runs_in_order_and_cleans_up_in_reverse() {
        let journal = Journal::default();
        let pipeline = Pipeline::new(vec![
            FakeStep::boxed("a", StepAction::Continue, &journal),
            FakeStep::boxed("b", StepAction::Continue, &journal),
            FakeStep::boxed("c", StepAction::Continue, &journal),
        ]);
        let mut state = new_state();

        let report = PipelineRunner::run(pipeline, &mut state, &CancellationToken::new()).await;

        assert_eq!(report.action, StepAction::Continue);
        assert_eq!(
            *journal.lock(),
            vec!["run:a", "run:b", "run:c", "cleanup:c", "cleanup:b", "cleanup:a"]
        );
        assert_eq!(report.metrics.executed(), vec!["a", "b", "c"]);
        assert!(report.metrics.step_duration_ms("b").is_some());
        assert!(!state.is_halted());
        assert!(report.into_result(&mut state).is_ok());
    }

    #[tokio::test]
    async fn test_halt_skips_remaining_steps_but_cleans_up() {
        let journal = Journal::default();
        let pipeline = Pipeline::new(vec![
            FakeStep::boxed("a", StepAction::Continue, &journal),
            FakeStep::boxed("b", StepAction::Halt, &journal),
            FakeStep::boxed("c", StepAction::Continue, &journal),
        ]);
        let mut state = new_state();

        let report = PipelineRunner::run(pipeline, &mut state, &CancellationToken::new()).await;

        assert_eq!(report.action, StepAction::Halt);
        assert_eq!(
            *journal.lock(),
            vec!["run:a", "run:b", "cleanup:b", "cleanup:a"]
        );
        assert!(state.is_halted());
        assert_eq!(report.metrics.step_duration_ms("c"), None);

        let err = report.into_result(&mut state).unwrap_err();
        assert_eq!(err.to_string(), "driver error: b failed");
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let journal = Journal::default();
        let cancel = CancellationToken::new();
        let pipeline = Pipeline::new(vec![
            Box::new(FakeStep {
                name: "a",
                action: StepAction::Continue,
                journal: journal.clone(),
                cancel_after: Some(cancel.clone()),
            }),
            FakeStep::boxed("b", StepAction::Continue, &journal),
        ]);
        let mut state = new_state();

        let report = PipelineRunner::run(pipeline, &mut state, &cancel).await;

        assert_eq!(report.action, StepAction::Halt);
        assert_eq!(*journal.lock(), vec!["run:a", "cleanup:a"]);
        assert!(state.is_cancelled());
        assert!(!state.is_halted());
        assert!(report.into_result(&mut state).unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_pipeline_continues() {
        let mut state = new_state();
        let pipeline = Pipeline::new(Vec::new());
        assert!(pipeline.is_empty());

        let report = PipelineRunner::run(pipeline, &mut state, &CancellationToken::new()).await;

        assert_eq!(report.action, StepAction::Continue);
        assert!(report.metrics.steps.is_empty());
    }

    #[tokio::test]
    async fn test_halt_without_error_is_internal() {
        struct SilentHalt;

        #[async_trait]
        impl Step for SilentHalt {
            async fn run(&self, _state: &mut BuildState) -> StepAction {
                StepAction::Halt
            }

            fn name(&self) -> &str {
                "silent_halt"
            }
        }

        let mut state = new_state();
        let pipeline = Pipeline::new(vec![Box::new(SilentHalt)]);

        let report = PipelineRunner::run(pipeline, &mut state, &CancellationToken::new()).await;

        let err = report.into_result(&mut state).unwrap_err();
        assert!(matches!(err, VmprovError::Internal(_)));
    }
}

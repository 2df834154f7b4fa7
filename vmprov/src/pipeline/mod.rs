//! Step-based provisioning pipeline.
//!
//! This module provides the runner that drives a build:
//! - Steps run one after another against a shared, typed build state
//! - Any step can halt the pipeline
//! - Every step that ran gets its cleanup, in reverse order, however the run ended
//!
//! ## Architecture
//!
//! ```text
//! Pipeline → Steps
//!
//! - Pipeline: Ordered list of steps
//! - Step: Idempotent unit of work with a run and a cleanup phase
//! - BuildState: Context threaded through every step (VM handle, UI, error)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pipeline::{BuildState, Pipeline, PipelineRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = Pipeline::new(vec![Box::new(StepA), Box::new(StepB)]);
//! let mut state = BuildState::new(ui).with_vm(vm);
//! let report = PipelineRunner::run(pipeline, &mut state, &CancellationToken::new()).await;
//! println!("pipeline took {}ms", report.metrics.total_duration_ms);
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod state;
mod step;

pub use metrics::{PipelineMetrics, StepMetrics};
pub use pipeline::{Pipeline, PipelineReport, PipelineRunner};
pub use state::BuildState;
pub use step::{BoxedStep, Step, StepAction};

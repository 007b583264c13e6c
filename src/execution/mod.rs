//! Action Execution Module
//!
//! Provides the engine that runs an action: jobs fanned out concurrently,
//! steps run in order inside each job, outputs passed between steps, and
//! per-job cleanup.
//!
//! # Architecture
//!
//! - [`engine`]: Action-level orchestration and run options
//! - [`job`]: Job context and the sequential step loop
//! - [`step`]: The runnable-step contract and step-scope accessor
//! - [`command`]: External command steps
//! - [`output`]: Per-job step output table
//! - [`cleanup`]: LIFO teardown stack
//! - [`writer`]: Stdout and stderr sinks for step output

pub mod cleanup;
pub mod command;
pub mod engine;
pub mod job;
pub mod output;
pub mod step;
pub mod writer;

pub use cleanup::{Cleanup, CleanupStack};
pub use command::CommandStep;
pub use engine::{ActionScope, Engine, ExecutorOptions};
pub use job::{JobContext, CONTEXT_ROOT};
pub use output::OutputTable;
pub use step::{RunnableStep, StepContext};
pub use writer::{SharedOutput, Writers};

//! Job Execution
//!
//! A job runs its steps strictly in order on one task. It owns:
//! - a working directory (`context.root`), created on first use
//! - the output table later steps read through `${out.<step>.<key>}`
//! - a cleanup stack drained when the job ends, whatever the outcome

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::action::{Job, Step, StepKind};
use crate::error::{ActionError, Result};
use crate::procedure::ProcedureRegistry;
use crate::variables::{VariableContainer, Variables};

use super::cleanup::{Cleanup, CleanupStack};
use super::command::CommandStep;
use super::engine::ActionScope;
use super::output::OutputTable;
use super::step::{RunnableStep, StepContext};
use super::writer::Writers;

/// Variable injected with the job's working directory.
pub const CONTEXT_ROOT: &str = "context.root";

/// Prefix of the temporary directory created for each job.
const ROOT_PREFIX: &str = "actionflow-";

/// Mutable state of one running job.
pub struct JobContext {
    id: String,
    variables: Variables,
    action: Arc<ActionScope>,
    root: OnceCell<TempDir>,
    outputs: OutputTable,
    cleanup: CleanupStack,
}

impl JobContext {
    pub fn new(id: impl Into<String>, variables: Variables, action: Arc<ActionScope>) -> Self {
        Self {
            id: id.into(),
            variables,
            action,
            root: OnceCell::new(),
            outputs: OutputTable::new(),
            cleanup: CleanupStack::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The job's working directory. Created on the first call.
    pub fn root(&self) -> Result<&Path> {
        let dir = self.root.get_or_try_init(|| {
            let dir = tempfile::Builder::new().prefix(ROOT_PREFIX).tempdir()?;
            debug!("Created root for job '{}': {}", self.id, dir.path().display());
            Ok::<_, ActionError>(dir)
        })?;
        Ok(dir.path())
    }

    /// Whether the working directory has been created.
    pub fn has_root(&self) -> bool {
        self.root.get().is_some()
    }

    /// Job variables over the action scope, with `context.root` injected.
    pub fn variables(&self) -> VariableContainer<'_> {
        let root = match self.root() {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                error!("Failed to inject {} for job '{}': {}", CONTEXT_ROOT, self.id, e);
                String::new()
            }
        };

        let mut extra = Variables::new();
        extra.insert(CONTEXT_ROOT.to_string(), root);

        VariableContainer::borrowed(&self.variables)
            .with_parent(self.action.variables())
            .with_extra(Cow::Owned(extra))
    }

    pub fn outputs(&self) -> &OutputTable {
        &self.outputs
    }

    pub fn writers(&self) -> &Writers {
        self.action.writers()
    }

    pub fn outputs_mut(&mut self) -> &mut OutputTable {
        &mut self.outputs
    }

    /// Pushes a teardown entry on this job's cleanup stack.
    pub fn defer(&mut self, cleanup: Cleanup) {
        self.cleanup.push(cleanup);
    }

    /// Pending teardown, in the order it will run.
    pub fn pending_cleanups(&self) -> Vec<String> {
        self.cleanup.pending()
    }

    /// Runs the cleanup stack, then removes the working directory.
    ///
    /// Failures are logged; the number of failed teardown entries is returned.
    pub fn close(&mut self) -> usize {
        let mut failures = self.cleanup.run();

        if let Some(dir) = self.root.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Removed root for job '{}': {}", self.id, path.display()),
                Err(e) => {
                    failures += 1;
                    error!("Failed to remove root {}: {}", path.display(), e);
                }
            }
        }

        if failures > 0 {
            warn!("Job '{}' finished with {} failed cleanups", self.id, failures);
        }
        failures
    }
}

/// Runs one job to completion.
pub(crate) struct JobRunner {
    job: Job,
    context: JobContext,
    registry: Arc<ProcedureRegistry>,
}

impl JobRunner {
    pub(crate) fn new(job: Job, action: Arc<ActionScope>, registry: Arc<ProcedureRegistry>) -> Self {
        let context = JobContext::new(job.display_id(), job.variables.clone(), action);
        Self {
            job,
            context,
            registry,
        }
    }

    /// Runs every step, then drains the cleanup stack and removes the root.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All steps completed
    /// * `Err(ActionError::Cancelled)` - Cancellation was observed
    /// * `Err(ActionError::Job { .. })` - A step failed
    ///
    /// A failing step cancels `cancel` before this job's own teardown
    /// starts, so sibling jobs stop at their next step boundary instead of
    /// waiting for it. Teardown runs on the blocking pool.
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let start = Instant::now();
        let id = self.context.id().to_string();
        info!("Running job: {}", id);

        let result = self.run_steps(&cancel).await;

        if let Err(e) = &result {
            if !e.is_cancelled() {
                debug!("Job '{}' failed, cancelling sibling jobs", id);
                cancel.cancel();
            }
        }

        let mut context = self.context;
        if let Err(e) = tokio::task::spawn_blocking(move || context.close()).await {
            error!("Cleanup of job '{}' did not finish: {}", id, e);
        }

        match result {
            Ok(()) => {
                info!("Job '{}' completed in {:.2?}", id, start.elapsed());
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                warn!("Job '{}' cancelled", id);
                Err(ActionError::Cancelled)
            }
            Err(e) => {
                error!("Failed to run job '{}': {}", id, e);
                Err(ActionError::Job {
                    job: id,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run_steps(&mut self, cancel: &CancellationToken) -> Result<()> {
        for step in &self.job.steps {
            if cancel.is_cancelled() {
                info!("Skipping remaining steps of job '{}'", self.context.id());
                return Err(ActionError::Cancelled);
            }

            info!("Running step: {}", step.human_name());
            let step_id = step.display_id();

            let outcome = match resolve(step, &self.registry) {
                Ok(runnable) => {
                    let mut sc = StepContext::new(step_id.clone(), &step.variables, &mut self.context);
                    runnable.run(cancel, &mut sc).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(Some(cleanup)) => self.context.defer(cleanup),
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(ActionError::Cancelled),
                Err(e) => {
                    error!("Failed to run step '{}': {}", step_id, e);
                    return Err(ActionError::Step {
                        step: step_id,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Turns a step payload into something runnable.
///
/// Procedure lookup and argument validation happen here, before any
/// side effect of the step.
fn resolve(step: &Step, registry: &ProcedureRegistry) -> Result<Box<dyn RunnableStep>> {
    match &step.run {
        StepKind::Command { command } => Ok(Box::new(CommandStep::new(command.clone()))),
        StepKind::Procedure { uses, with } => registry.resolve(uses, with),
    }
}

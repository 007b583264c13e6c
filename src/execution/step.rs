//! Individual Step Execution
//!
//! Defines the contract every runnable step implements and the
//! step-scope accessor handed to it:
//! - Variable lookup through the step -> job -> action chain
//! - `${out.<step>.<key>}` output references
//! - The job's working root and output table
//! - Teardown registration on the job's cleanup stack

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::variables::{VariableContainer, Variables};

use super::cleanup::Cleanup;
use super::job::JobContext;
use super::writer::Writers;

/// A unit of work the engine can execute.
///
/// Implementations should honor `cancel` inside any long blocking call.
/// A returned [`Cleanup`] is pushed on the job's cleanup stack and runs
/// when the job ends.
///
/// An `Err` carries no cleanup. A step that allocates something and may
/// still fail afterwards must register its teardown with
/// [`StepContext::defer`] as soon as the resource exists; anything only
/// returned in `Ok` is lost when the step fails.
#[async_trait]
pub trait RunnableStep: Send + Sync + fmt::Debug {
    async fn run(
        &self,
        cancel: &CancellationToken,
        sc: &mut StepContext<'_>,
    ) -> Result<Option<Cleanup>>;
}

/// Step-scope view of the running job.
pub struct StepContext<'a> {
    id: String,
    variables: &'a Variables,
    job: &'a mut JobContext,
}

impl<'a> StepContext<'a> {
    pub fn new(id: impl Into<String>, variables: &'a Variables, job: &'a mut JobContext) -> Self {
        Self {
            id: id.into(),
            variables,
            job,
        }
    }

    /// The id this step's outputs are recorded under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the job running this step.
    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    /// The job's working directory, created on first use.
    pub fn root(&self) -> Result<PathBuf> {
        Ok(self.job.root()?.to_path_buf())
    }

    /// The composed variable chain: step, then job, then action.
    pub fn variables(&self) -> VariableContainer<'_> {
        VariableContainer::borrowed(self.variables).with_parent(self.job.variables())
    }

    pub fn get_variable(&self, key: &str) -> Option<String> {
        self.variables().get(key)
    }

    pub fn get_raw_variable(&self, key: &str) -> Option<String> {
        self.variables().get_raw(key).map(str::to_string)
    }

    /// Expands every placeholder in `s`.
    ///
    /// Variables are resolved first; a name of the form
    /// `out.<step>.<key>` that is not a variable reads the job's output
    /// table. Anything unresolved becomes an empty string.
    pub fn expand_string(&self, s: &str) -> String {
        let outputs = self.job.outputs();
        self.variables()
            .expand_with(s, |name| outputs.resolve_reference(name))
    }

    /// Records an output of this step.
    pub fn set_output(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        debug!("Step '{}' set output '{}'", self.id, key);
        self.job.outputs_mut().set(&self.id, key, value);
    }

    /// Reads an output recorded by any step of this job.
    pub fn get_output(&self, step: &str, key: &str) -> Option<&Value> {
        self.job.outputs().get(step, key)
    }

    /// Reads an output recorded by this step.
    pub fn get_this_output(&self, key: &str) -> Option<&Value> {
        self.get_output(&self.id, key)
    }

    /// Environment exported to subprocesses.
    ///
    /// Every variable of the chain, expanded, with upper-cased keys.
    /// Keys containing a `.` are internal (such as `context.root`) and
    /// are left out.
    pub fn environment(&self) -> Vec<(String, String)> {
        self.variables()
            .list_all()
            .into_iter()
            .filter(|(key, _)| !key.contains('.'))
            .map(|(key, value)| (key.to_uppercase(), value))
            .collect()
    }

    /// Registers teardown on the job's cleanup stack right away.
    pub fn defer(&mut self, cleanup: Cleanup) {
        self.job.defer(cleanup);
    }

    /// Sinks for anything the step prints.
    pub fn writers(&self) -> &Writers {
        self.job.writers()
    }
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("id", &self.id)
            .field("job", &self.job.id())
            .finish_non_exhaustive()
    }
}

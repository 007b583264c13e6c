//! Action Execution Engine
//!
//! The engine that runs an action:
//! - One task per job, all started at once
//! - A shared cancellation token, cancelled by the first job failure
//! - Waits for every job (and its cleanup) before returning
//! - Runtime variables and the process environment folded into the
//!   action scope, beneath the action's own variables
//! - Step output sent to caller-supplied writers

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::error::{ActionError, Result};
use crate::procedure::ProcedureRegistry;
use crate::variables::{VariableContainer, Variables};

use super::job::JobRunner;
use super::writer::{shared, Writers};

/// Caller-supplied settings for an action run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Defaults supplied by the caller. The action's own variables, and
    /// job and step variables, shadow them; the environment sits below.
    #[serde(default)]
    pub runtime_variables: Variables,

    /// Expose the process environment as the lowest-priority scope.
    #[serde(default)]
    pub inherit_environment: bool,

    /// Where steps write their stdout and stderr.
    #[serde(skip)]
    pub writers: Writers,
}

impl ExecutorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `vars` into the runtime variables; later values win.
    pub fn with_runtime_variables<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.runtime_variables
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds a single runtime variable.
    pub fn with_runtime_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_variables.insert(key.into(), value.into());
        self
    }

    /// Makes the current process environment visible to the action.
    pub fn with_current_environment(mut self) -> Self {
        self.inherit_environment = true;
        self
    }

    /// Sends step stdout to `writer` instead of the process stdout.
    pub fn with_stdout<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.writers.set_stdout(shared(writer));
        self
    }

    /// Sends step stderr to `writer` instead of the process stderr.
    pub fn with_stderr<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.writers.set_stderr(shared(writer));
        self
    }
}

/// Read-only action-level scope shared by every job.
#[derive(Debug, Clone, Default)]
pub struct ActionScope {
    id: String,
    variables: Variables,
    runtime: Variables,
    environment: Option<Variables>,
    writers: Writers,
}

impl ActionScope {
    pub fn new(id: impl Into<String>, variables: Variables) -> Self {
        Self {
            id: id.into(),
            variables,
            ..Self::default()
        }
    }

    /// Adds caller-supplied variables beneath the action variables.
    pub fn with_runtime_variables(mut self, runtime: Variables) -> Self {
        self.runtime = runtime;
        self
    }

    /// Adds an environment layer beneath every other scope.
    pub fn with_environment(mut self, environment: Variables) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_writers(mut self, writers: Writers) -> Self {
        self.writers = writers;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn writers(&self) -> &Writers {
        &self.writers
    }

    /// Action variables, then runtime variables, then the environment.
    pub fn variables(&self) -> VariableContainer<'_> {
        let mut container = VariableContainer::borrowed(&self.variables);

        if !self.runtime.is_empty() {
            container = container.with_parent(VariableContainer::borrowed(&self.runtime));
        }

        if let Some(environment) = &self.environment {
            container = container.with_parent(VariableContainer::borrowed(environment));
        }

        container
    }
}

/// Snapshot of the current process environment.
pub fn current_environment() -> Variables {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect::<BTreeMap<_, _>>()
}

/// Action execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use actionflow::action::{Action, Job, Step};
/// use actionflow::execution::Engine;
/// use actionflow::procedure::ProcedureRegistry;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let action = Action::new("hello").with_job(
///     Job::new("greet").with_step(Step::command("say", ["echo", "hello"])),
/// );
///
/// let engine = Engine::new(Arc::new(ProcedureRegistry::with_builtins()?));
/// engine.run(action).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<ProcedureRegistry>,
    options: ExecutorOptions,
}

impl Engine {
    /// Creates an engine resolving procedures from `registry`.
    pub fn new(registry: Arc<ProcedureRegistry>) -> Self {
        Self {
            registry,
            options: ExecutorOptions::default(),
        }
    }

    /// Replaces the run options.
    pub fn set_options(&mut self, options: ExecutorOptions) {
        self.options = options;
    }

    /// Merges runtime variables into the options.
    pub fn set_runtime_variables(&mut self, vars: Variables) {
        self.options.runtime_variables.extend(vars);
    }

    /// Enables or disables inheriting the process environment.
    pub fn set_inherit_environment(&mut self, inherit: bool) {
        self.options.inherit_environment = inherit;
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ProcedureRegistry> {
        &self.registry
    }

    /// Runs `action` until every job has finished.
    pub async fn run(&self, action: Action) -> Result<()> {
        self.run_with_cancellation(action, CancellationToken::new())
            .await
    }

    /// Runs `action`, stopping early when `cancel` is triggered.
    ///
    /// This is the main entry point that:
    /// 1. Builds the action scope from the definition and options
    /// 2. Spawns one task per job sharing a child of `cancel`
    /// 3. Cancels the remaining jobs on the first job failure
    /// 4. Waits for every job and its cleanup
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every job completed
    /// * `Err(ActionError::Action { .. })` - The first job failure
    /// * `Err(ActionError::Cancelled)` - Jobs stopped only because of cancellation
    pub async fn run_with_cancellation(
        &self,
        action: Action,
        cancel: CancellationToken,
    ) -> Result<()> {
        let start = Instant::now();
        let action_id = action.display_id();
        info!(
            "Running action: {} ({} jobs, {} steps)",
            action_id,
            action.jobs.len(),
            action.step_count()
        );

        let mut scope = ActionScope::new(action_id.clone(), action.variables)
            .with_runtime_variables(self.options.runtime_variables.clone())
            .with_writers(self.options.writers.clone());
        if self.options.inherit_environment {
            scope = scope.with_environment(current_environment());
        }
        let scope = Arc::new(scope);

        let cancel = cancel.child_token();
        let mut jobs = JoinSet::new();

        for job in action.jobs {
            let runner = JobRunner::new(job, Arc::clone(&scope), Arc::clone(&self.registry));
            jobs.spawn(runner.run(cancel.clone()));
        }

        let mut first_error: Option<ActionError> = None;
        let mut cancelled = false;

        while let Some(joined) = jobs.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(ActionError::TaskFailed(e.to_string())));

            match result {
                Ok(()) => {}
                Err(ActionError::Cancelled) => cancelled = true,
                Err(e) => {
                    if first_error.is_none() {
                        debug!("Cancelling sibling jobs of action '{}'", action_id);
                        cancel.cancel();
                        first_error = Some(e);
                    } else {
                        warn!("Additional job failure in action '{}': {}", action_id, e);
                    }
                }
            }
        }

        let elapsed = start.elapsed();

        match first_error {
            Some(e) => {
                error!("Failed to run action '{}': {}", action_id, e);
                Err(ActionError::Action {
                    action: action_id,
                    source: Box::new(e),
                })
            }
            None if cancelled => {
                warn!("Action '{}' cancelled after {:.2?}", action_id, elapsed);
                Err(ActionError::Cancelled)
            }
            None => {
                info!("Action '{}' completed in {:.2?}", action_id, elapsed);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Job, Step};
    use crate::execution::writer::tests::Buffer;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn engine() -> Engine {
        Engine::new(Arc::new(ProcedureRegistry::with_builtins().unwrap()))
    }

    #[test]
    fn test_options_builders() {
        let options = ExecutorOptions::new()
            .with_runtime_variables([("A", "1"), ("B", "2")])
            .with_runtime_variable("A", "3")
            .with_current_environment();

        assert_eq!(options.runtime_variables.get("A").map(String::as_str), Some("3"));
        assert_eq!(options.runtime_variables.len(), 2);
        assert!(options.inherit_environment);
    }

    #[test]
    fn test_engine_configuration() {
        let mut engine = engine();
        assert!(engine.options().runtime_variables.is_empty());
        assert!(!engine.options().inherit_environment);

        engine.set_runtime_variables(vars(&[("X", "1")]));
        engine.set_inherit_environment(true);

        assert_eq!(engine.options().runtime_variables.len(), 1);
        assert!(engine.options().inherit_environment);
        assert!(engine.registry().contains("action/echo"));
    }

    #[test]
    fn test_scope_layering() {
        let scope = ActionScope::new("a", vars(&[("NAME", "action"), ("ONLY_ACTION", "x")]))
            .with_runtime_variables(vars(&[
                ("NAME", "runtime"),
                ("MODE", "runtime"),
                ("ONLY_RUNTIME", "$ONLY_ACTION"),
            ]))
            .with_environment(vars(&[("NAME", "env"), ("MODE", "env"), ("ONLY_ENV", "y")]));

        let chain = scope.variables();
        assert_eq!(chain.get("NAME").as_deref(), Some("action"));
        assert_eq!(chain.get("MODE").as_deref(), Some("runtime"));
        assert_eq!(chain.get("ONLY_RUNTIME").as_deref(), Some("x"));
        assert_eq!(chain.get("ONLY_ACTION").as_deref(), Some("x"));
        assert_eq!(chain.get("ONLY_ENV").as_deref(), Some("y"));
        assert_eq!(scope.id(), "a");
    }

    #[test]
    fn test_current_environment_snapshot() {
        std::env::set_var("ACTIONFLOW_ENGINE_TEST", "present");
        let env = current_environment();
        assert_eq!(
            env.get("ACTIONFLOW_ENGINE_TEST").map(String::as_str),
            Some("present")
        );
    }

    #[tokio::test]
    async fn test_echo_writes_to_configured_stdout() {
        let out = Buffer::default();
        let mut engine = engine();
        engine.set_options(ExecutorOptions::new().with_stdout(out.clone()));

        let action = Action::new("echo").with_job(
            Job::new("job").with_step(Step::procedure("s", "action/echo", [("message", "hi there")])),
        );
        engine.run(action).await.unwrap();

        assert_eq!(out.contents(), "hi there\n");
    }

    #[tokio::test]
    async fn test_run_empty_action() {
        let result = engine().run(Action::new("empty")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_unknown_procedure_fails() {
        let action = Action::new("failure").with_job(
            Job::new("job").with_step(Step::procedure("s", "not/registered", [("a", "b")])),
        );

        let err = engine().run(action).await.unwrap_err();
        assert!(matches!(err, ActionError::Action { .. }));
        assert!(matches!(err.root_cause(), ActionError::ProcedureNotFound(name) if name == "not/registered"));
        assert!(err.to_string().contains("not/registered"));
    }

    #[tokio::test]
    async fn test_run_precancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let action = Action::new("cancelled").with_job(
            Job::new("job").with_step(Step::procedure("s", "action/echo", [("message", "hi")])),
        );

        let err = engine()
            .run_with_cancellation(action, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Cancelled));
    }
}

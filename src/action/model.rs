//! Action Data Model
//!
//! An action is a tree: the action holds jobs, each job holds steps.
//! Jobs run in parallel, steps within a job run in order.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: hello
//! variables:
//!   HELLO_ACTION: action world
//! jobs:
//!   - id: greet
//!     variables:
//!       HELLO_JOB: job world
//!     steps:
//!       - id: say
//!         variables:
//!           HELLO_STEP: step world
//!         run:
//!           type: command
//!           command: [echo, "$HELLO_STEP $HELLO_JOB $HELLO_ACTION"]
//!       - name: Write greeting
//!         run:
//!           type: procedure
//!           uses: action/write
//!           with:
//!             filename: greeting.txt
//!             content: ${out.say.stdout}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::variables::Variables;

/// Untyped arguments passed to a procedure builder.
pub type ProcedureArgs = BTreeMap<String, String>;

/// The root of a workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Action {
    /// Identifier; derived from the definition's hash when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Action-scope variables, visible to every job and step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,

    /// Jobs started concurrently when the action runs
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// A unit of parallel execution holding sequential steps.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Job {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single unit of work inside a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Identifier used by `${out.<id>.<key>}` references
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Optional human-readable label for logs
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,

    /// What the step executes
    pub run: StepKind,
}

/// The runnable payload of a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Run a program; the first element is the executable.
    Command { command: Vec<String> },

    /// Run a procedure resolved by name from the registry.
    Procedure {
        uses: String,
        #[serde(default)]
        with: ProcedureArgs,
    },
}

/// Short, stable identifier derived from a serialized definition.
fn structural_id<T: Serialize>(value: &T, fallback: &str) -> String {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let hex = blake3::hash(&bytes).to_hex();
            hex.as_str()[..16].to_string()
        }
        Err(_) => fallback.to_string(),
    }
}

impl Action {
    /// Creates an empty action.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds an action-scope variable.
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Appends a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// The explicit id, or a hash of the definition when none is set.
    pub fn display_id(&self) -> String {
        if self.id.is_empty() {
            structural_id(self, "<unknown action>")
        } else {
            self.id.clone()
        }
    }

    /// Total number of steps across all jobs.
    pub fn step_count(&self) -> usize {
        self.jobs.iter().map(|job| job.steps.len()).sum()
    }
}

impl Job {
    /// Creates an empty job.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds a job-scope variable.
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Appends a step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// The explicit id, or a hash of the definition when none is set.
    pub fn display_id(&self) -> String {
        if self.id.is_empty() {
            structural_id(self, "<unknown job>")
        } else {
            self.id.clone()
        }
    }
}

impl Step {
    /// Creates a step running a program with arguments.
    ///
    /// # Example
    ///
    /// ```
    /// use actionflow::action::Step;
    ///
    /// let step = Step::command("greet", ["echo", "hello ${who}"]).with_variable("who", "world");
    /// assert_eq!(step.human_name(), "greet");
    /// ```
    pub fn command<I, S>(id: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: String::new(),
            variables: Variables::new(),
            run: StepKind::Command {
                command: command.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Creates a step invoking a registered procedure.
    pub fn procedure<I, K, V>(id: impl Into<String>, uses: impl Into<String>, with: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            name: String::new(),
            variables: Variables::new(),
            run: StepKind::Procedure {
                uses: uses.into(),
                with: with
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
        }
    }

    /// Sets the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a step-scope variable.
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// The explicit id, or a hash of the definition when none is set.
    pub fn display_id(&self) -> String {
        if self.id.is_empty() {
            structural_id(self, "<unknown step>")
        } else {
            self.id.clone()
        }
    }

    /// The name if set, otherwise the id.
    pub fn human_name(&self) -> String {
        if self.name.is_empty() {
            self.display_id()
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command } => write!(f, "command {:?}", command),
            Self::Procedure { uses, .. } => write!(f, "procedure {}", uses),
        }
    }
}

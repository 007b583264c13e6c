//! Error Types
//!
//! A single error enum covers configuration problems (unknown procedures,
//! missing arguments), execution failures and cooperative cancellation.
//! Wrapping variants add the procedure, step, job or action identifier so
//! the caller receives one terminal error carrying the full path.

use thiserror::Error;

/// Errors produced while building or running an action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No builder is registered under the procedure name.
    #[error("no procedure step builder found for {0}")]
    ProcedureNotFound(String),

    /// A procedure builder was called without a mandatory argument.
    #[error("missing required argument: {0}")]
    RequiredArgument(String),

    /// Two builders were registered under the same name.
    #[error("namespace conflict: procedure '{0}' is already registered")]
    DuplicateProcedure(String),

    /// A command step with no program to run.
    #[error("command step has no program to run")]
    EmptyCommand,

    /// A procedure path argument points outside the job root.
    #[error("path '{0}' escapes the job root")]
    PathOutsideRoot(String),

    /// The action definition failed validation.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The action definition could not be read or decoded.
    #[error("failed to parse action: {0}")]
    Parse(String),

    /// A subprocess exited unsuccessfully.
    #[error("command '{program}' exited with status {}", describe_code(.code))]
    CommandFailed { program: String, code: Option<i32> },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A job task panicked or was aborted by the runtime.
    #[error("job task failed: {0}")]
    TaskFailed(String),

    /// The shared cancellation signal was observed.
    #[error("execution cancelled")]
    Cancelled,

    #[error("build step {procedure}: {source}")]
    Build {
        procedure: String,
        #[source]
        source: Box<ActionError>,
    },

    #[error("failed to run step {step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<ActionError>,
    },

    #[error("run job {job}: {source}")]
    Job {
        job: String,
        #[source]
        source: Box<ActionError>,
    },

    #[error("run action {action}: {source}")]
    Action {
        action: String,
        #[source]
        source: Box<ActionError>,
    },
}

impl ActionError {
    /// Creates an error for a missing builder argument.
    pub fn required(key: impl Into<String>) -> Self {
        Self::RequiredArgument(key.into())
    }

    /// Returns true if this error is, or wraps, a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Build { source, .. }
            | Self::Step { source, .. }
            | Self::Job { source, .. }
            | Self::Action { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Returns the innermost error beneath all identifier wrappers.
    pub fn root_cause(&self) -> &ActionError {
        match self {
            Self::Build { source, .. }
            | Self::Step { source, .. }
            | Self::Job { source, .. }
            | Self::Action { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ActionError>;

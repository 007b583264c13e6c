//! actionflow - Declarative Action Execution Engine
//!
//! Runs actions described as a tree of jobs and steps. Jobs start
//! concurrently, steps inside a job run in order, and every job gets its
//! own working directory, output table and cleanup stack.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`action`]: Data structures, loading and validation of definitions
//! - [`variables`]: Scope-chained variables with `${name}` interpolation
//! - [`execution`]: The engine, job and step contexts, command steps, cleanup
//! - [`procedure`]: Named procedures resolved from a registry
//! - [`error`]: The error type shared by every module
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use actionflow::{load_action, Engine, ProcedureRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load an action from YAML
//!     let action = load_action("action.yaml")?;
//!
//!     // Create execution engine
//!     let registry = Arc::new(ProcedureRegistry::with_builtins()?);
//!     let mut engine = Engine::new(registry);
//!     engine.set_inherit_environment(true);
//!
//!     // Execute the action
//!     engine.run(action).await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod error;
pub mod execution;
pub mod procedure;
pub mod variables;

// Re-export commonly used types
pub use action::{load_action, Action, Job, Step, StepKind};
pub use error::ActionError;
pub use execution::engine::{Engine, ExecutorOptions};
pub use procedure::ProcedureRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "actionflow";

//! Named Procedures
//!
//! A step can name a procedure (`uses: action/write`) instead of a literal
//! command. The registry resolves the name to a builder, which validates the
//! step's string arguments and returns a runnable step.
//!
//! - [`registry`]: Name to builder mapping
//! - [`argument`]: Raw arguments expanded when the step runs
//! - [`builtin`]: Procedures available out of the box

pub mod argument;
pub mod builtin;
pub mod registry;

pub use argument::Argument;
pub use builtin::register_builtins;
pub use registry::{ProcedureBuilder, ProcedureRegistry};

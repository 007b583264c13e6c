//! Action Definition Module
//!
//! Data structures, loading and validation for action definitions.
//!
//! - [`model`]: Action, Job and Step types
//! - [`parser`]: YAML/JSON loading and saving
//! - [`validator`]: Structural checks

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Action, Job, ProcedureArgs, Step, StepKind};
pub use parser::{load_action, parse_action, save_action};
pub use validator::validate_action;

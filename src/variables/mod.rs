//! Variable Resolution Module
//!
//! Hierarchical key/value scopes with lazy `${name}` interpolation.
//!
//! - [`container`]: scope chains (step -> job -> action -> runtime)
//! - [`expand`]: placeholder syntax

pub mod container;
pub mod expand;

pub use container::{VariableContainer, Variables};
pub use expand::{expand, placeholders};

//! Procedure Registry
//!
//! Maps procedure names (such as `action/write`) to builders that turn the
//! untyped `with` arguments of a step into a runnable step. Registration
//! usually happens once at startup; resolution happens concurrently from
//! every running job.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::action::ProcedureArgs;
use crate::error::{ActionError, Result};
use crate::execution::RunnableStep;

use super::builtin::register_builtins;

/// Builds a runnable step from its raw arguments.
///
/// Builders validate required arguments and must not have side effects.
pub type ProcedureBuilder =
    Arc<dyn Fn(&ProcedureArgs) -> Result<Box<dyn RunnableStep>> + Send + Sync>;

/// Registry of named procedure builders.
///
/// # Example
///
/// ```
/// use actionflow::procedure::ProcedureRegistry;
///
/// let registry = ProcedureRegistry::with_builtins().unwrap();
/// assert!(registry.contains("action/echo"));
/// assert!(registry.resolve("not/registered", &Default::default()).is_err());
/// ```
#[derive(Default)]
pub struct ProcedureRegistry {
    builders: RwLock<HashMap<String, ProcedureBuilder>>,
}

impl ProcedureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in procedures.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        register_builtins(&registry)?;
        Ok(registry)
    }

    /// Registers `builder` under `name`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The name was free
    /// * `Err(ActionError::DuplicateProcedure)` - The name is already taken
    pub fn register<F>(&self, name: impl Into<String>, builder: F) -> Result<()>
    where
        F: Fn(&ProcedureArgs) -> Result<Box<dyn RunnableStep>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registering procedure: {}", name);

        let mut builders = self.builders.write().unwrap_or_else(PoisonError::into_inner);
        if builders.contains_key(&name) {
            return Err(ActionError::DuplicateProcedure(name));
        }

        builders.insert(name, Arc::new(builder));
        Ok(())
    }

    /// Builds the step registered under `name`.
    ///
    /// # Returns
    ///
    /// * `Err(ActionError::ProcedureNotFound)` - Nothing is registered under `name`
    /// * `Err(ActionError::Build { .. })` - The builder rejected `args`
    pub fn resolve(&self, name: &str, args: &ProcedureArgs) -> Result<Box<dyn RunnableStep>> {
        debug!("Resolving procedure: {} with {:?}", name, args);

        let builder = self
            .builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::ProcedureNotFound(name.to_string()))?;

        builder(args).map_err(|e| ActionError::Build {
            procedure: name.to_string(),
            source: Box::new(e),
        })
    }

    /// Whether a procedure is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Cleanup, StepContext};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl RunnableStep for Noop {
        async fn run(
            &self,
            _cancel: &CancellationToken,
            _sc: &mut StepContext<'_>,
        ) -> Result<Option<Cleanup>> {
            Ok(None)
        }
    }

    fn noop(_args: &ProcedureArgs) -> Result<Box<dyn RunnableStep>> {
        Ok(Box::new(Noop))
    }

    #[test]
    fn test_registry_new() {
        let registry = ProcedureRegistry::new();
        assert!(registry.names().is_empty());
        assert!(!registry.contains("test/noop"));
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ProcedureRegistry::new();
        registry.register("test/noop", noop).unwrap();

        assert!(registry.contains("test/noop"));
        assert!(registry.resolve("test/noop", &ProcedureArgs::new()).is_ok());
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ProcedureRegistry::new();
        registry.register("test/noop", noop).unwrap();

        let err = registry.register("test/noop", noop).unwrap_err();
        assert!(matches!(err, ActionError::DuplicateProcedure(name) if name == "test/noop"));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ProcedureRegistry::new();
        let err = registry
            .resolve("not/registered", &ProcedureArgs::new())
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "no procedure step builder found for not/registered"
        );
    }

    #[test]
    fn test_builder_error_is_wrapped() {
        let registry = ProcedureRegistry::new();
        registry
            .register("test/needs-name", |args: &ProcedureArgs| {
                if args.get("name").map_or(true, String::is_empty) {
                    return Err(ActionError::required("name"));
                }
                Ok(Box::new(Noop) as Box<dyn RunnableStep>)
            })
            .unwrap();

        let err = registry
            .resolve("test/needs-name", &ProcedureArgs::new())
            .unwrap_err();
        assert!(matches!(err, ActionError::Build { ref procedure, .. } if procedure == "test/needs-name"));
        assert!(matches!(err.root_cause(), ActionError::RequiredArgument(key) if key == "name"));
    }

    #[test]
    fn test_names_sorted_with_builtins() {
        let registry = ProcedureRegistry::with_builtins().unwrap();
        assert_eq!(
            registry.names(),
            vec!["action/copy-local-dir", "action/echo", "action/write"]
        );
        assert!(format!("{:?}", registry).contains("action/echo"));
    }

    #[test]
    fn test_builtins_twice_conflict() {
        let registry = ProcedureRegistry::with_builtins().unwrap();
        assert!(register_builtins(&registry).is_err());
    }
}

//! Cleanup Stack
//!
//! Steps may hand back a teardown entry when they succeed (or fail after
//! allocating something). Each job owns one stack and drains it when the
//! job ends, most recently pushed entry first, like a chain of `defer`
//! blocks.
//!
//! Entries are plain data where possible so the pending teardown of a job
//! can be inspected before it runs.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use log::{debug, error};

use crate::error::Result;

/// Step-defined teardown logic.
pub type CleanupHook = Box<dyn FnOnce() -> Result<()> + Send + Sync>;

/// A single teardown entry.
pub enum Cleanup {
    /// Remove a file. A file that is already gone is not an error.
    RemoveFile(PathBuf),

    /// Recursively remove a directory. A missing directory is not an error.
    RemoveDir(PathBuf),

    /// Run custom teardown logic.
    Hook {
        description: String,
        hook: CleanupHook,
    },
}

impl Cleanup {
    /// Creates a custom teardown entry.
    pub fn hook<F>(description: impl Into<String>, hook: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + Sync + 'static,
    {
        Self::Hook {
            description: description.into(),
            hook: Box::new(hook),
        }
    }

    /// Human-readable summary of what this entry does.
    pub fn description(&self) -> String {
        match self {
            Self::RemoveFile(path) => format!("remove file {}", path.display()),
            Self::RemoveDir(path) => format!("remove directory {}", path.display()),
            Self::Hook { description, .. } => description.clone(),
        }
    }

    /// Performs the teardown.
    pub fn run(self) -> Result<()> {
        match self {
            Self::RemoveFile(path) => match fs::remove_file(&path) {
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("File already removed: {}", path.display());
                    Ok(())
                }
                other => Ok(other?),
            },
            Self::RemoveDir(path) => match fs::remove_dir_all(&path) {
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Directory already removed: {}", path.display());
                    Ok(())
                }
                other => Ok(other?),
            },
            Self::Hook { hook, .. } => hook(),
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveFile(path) => f.debug_tuple("RemoveFile").field(path).finish(),
            Self::RemoveDir(path) => f.debug_tuple("RemoveDir").field(path).finish(),
            Self::Hook { description, .. } => f
                .debug_struct("Hook")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}

/// LIFO stack of teardown entries.
///
/// The default value is an empty stack. Dropping a stack that still holds
/// entries runs them, so teardown also happens when a job unwinds.
#[derive(Debug, Default)]
pub struct CleanupStack {
    entries: Vec<Cleanup>,
}

impl CleanupStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry on top of the stack.
    pub fn push(&mut self, entry: Cleanup) {
        debug!("Registered cleanup: {}", entry.description());
        self.entries.push(entry);
    }

    /// Removes and returns the most recently pushed entry.
    pub fn pop(&mut self) -> Option<Cleanup> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions of the pending entries, in the order they will run.
    pub fn pending(&self) -> Vec<String> {
        self.entries.iter().rev().map(Cleanup::description).collect()
    }

    /// Drains the stack, running every entry exactly once.
    ///
    /// A failing or panicking entry is logged and does not stop the
    /// remaining ones.
    ///
    /// # Returns
    ///
    /// The number of entries that failed.
    pub fn run(&mut self) -> usize {
        let mut failures = 0;

        while let Some(entry) = self.pop() {
            let description = entry.description();

            match panic::catch_unwind(AssertUnwindSafe(|| entry.run())) {
                Ok(Ok(())) => debug!("Cleanup done: {}", description),
                Ok(Err(e)) => {
                    failures += 1;
                    error!("Cleanup '{}' failed: {}", description, e);
                }
                Err(_) => {
                    failures += 1;
                    error!("Cleanup '{}' panicked", description);
                }
            }
        }

        failures
    }

    /// Runs `stack` if present. An absent stack has nothing to run.
    pub fn run_optional(stack: Option<&mut CleanupStack>) -> usize {
        stack.map_or(0, CleanupStack::run)
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.run();
        }
    }
}

//! Action Validation
//!
//! Structural checks run when an action is loaded:
//! - Job ids unique within the action
//! - Step ids unique within their job
//! - Non-empty command and procedure payloads
//! - Output references pointing at earlier steps (warning only)

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::error::{ActionError, Result};
use crate::execution::output::parse_reference;
use crate::variables::placeholders;

use super::model::{Action, Job, Step, StepKind};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateJobId(String),
    DuplicateStepId { job: String, step: String },
    EmptyCommand { job: String, step: String },
    EmptyProcedure { job: String, step: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateJobId(id) => write!(f, "Duplicate job ID: '{}'", id),
            Self::DuplicateStepId { job, step } => {
                write!(f, "Job '{}': duplicate step ID '{}'", job, step)
            }
            Self::EmptyCommand { job, step } => {
                write!(f, "Job '{}': step '{}' has an empty command", job, step)
            }
            Self::EmptyProcedure { job, step } => {
                write!(f, "Job '{}': step '{}' names no procedure", job, step)
            }
        }
    }
}

/// Validates a single step's payload.
fn validate_step(job: &str, step: &Step) -> Option<ValidationError> {
    match &step.run {
        StepKind::Command { command } if command.is_empty() => Some(ValidationError::EmptyCommand {
            job: job.to_string(),
            step: step.display_id(),
        }),
        StepKind::Procedure { uses, .. } if uses.trim().is_empty() => {
            Some(ValidationError::EmptyProcedure {
                job: job.to_string(),
                step: step.display_id(),
            })
        }
        _ => None,
    }
}

/// Raw strings of a step that are expanded when it runs.
fn expandable_strings(step: &Step) -> Vec<&str> {
    let mut strings: Vec<&str> = step.variables.values().map(String::as_str).collect();
    match &step.run {
        StepKind::Command { command } => strings.extend(command.iter().map(String::as_str)),
        StepKind::Procedure { with, .. } => strings.extend(with.values().map(String::as_str)),
    }
    strings
}

/// Warns about `${out.<step>.<key>}` references no earlier step can satisfy.
fn check_output_references(job: &Job, job_id: &str) {
    let mut earlier: HashSet<String> = HashSet::new();

    for step in &job.steps {
        for text in expandable_strings(step) {
            for name in placeholders(text) {
                if let Some((target, _)) = parse_reference(name) {
                    if !earlier.contains(target) {
                        warn!(
                            "Job '{}': step '{}' references output of '{}', which does not run before it",
                            job_id,
                            step.human_name(),
                            target
                        );
                    }
                }
            }
        }
        earlier.insert(step.display_id());
    }
}

/// Collects every validation error of `action`.
pub fn quick_validate(action: &Action) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut job_ids: HashSet<&str> = HashSet::new();

    for job in &action.jobs {
        if !job.id.is_empty() && !job_ids.insert(job.id.as_str()) {
            errors.push(ValidationError::DuplicateJobId(job.id.clone()));
        }

        let job_id = job.display_id();
        let mut step_ids: HashSet<&str> = HashSet::new();

        for step in &job.steps {
            if !step.id.is_empty() && !step_ids.insert(step.id.as_str()) {
                errors.push(ValidationError::DuplicateStepId {
                    job: job_id.clone(),
                    step: step.id.clone(),
                });
            }
            errors.extend(validate_step(&job_id, step));
        }
    }

    errors
}

/// Validates the entire action structure.
///
/// Output references that cannot resolve are only logged; at run time they
/// expand to an empty string.
///
/// # Returns
///
/// * `Ok(())` - The action can be run
/// * `Err(ActionError::InvalidAction)` - Every problem found, one per line
pub fn validate_action(action: &Action) -> Result<()> {
    info!(
        "Validating action with {} jobs, {} steps",
        action.jobs.len(),
        action.step_count()
    );

    if action.jobs.is_empty() {
        warn!("Action '{}' has no jobs", action.display_id());
    }

    let errors = quick_validate(action);
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(ActionError::InvalidAction(messages.join("\n")));
    }

    for job in &action.jobs {
        let job_id = job.display_id();
        if job.steps.is_empty() {
            debug!("Job '{}' has no steps", job_id);
        }
        check_output_references(job, &job_id);
    }

    info!("Action validated: {}", action.display_id());
    Ok(())
}

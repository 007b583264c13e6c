//! Action Parser
//!
//! Loads and saves action definitions. Files ending in `.json` use JSON;
//! every other extension is read and written as YAML.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::{ActionError, Result};

use super::model::Action;
use super::validator::validate_action;

/// Serialization format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parses an action definition from text.
pub fn parse_action(content: &str, json: bool) -> Result<Action> {
    let action: Action = if json {
        serde_json::from_str(content).map_err(|e| ActionError::Parse(e.to_string()))?
    } else {
        serde_yaml::from_str(content).map_err(|e| ActionError::Parse(e.to_string()))?
    };

    validate_action(&action)?;
    Ok(action)
}

/// Loads an action from a YAML or JSON file.
///
/// This function:
/// 1. Reads the file
/// 2. Decodes it according to its extension
/// 3. Validates the action structure
///
/// # Arguments
///
/// * `path` - Path to the action file
///
/// # Returns
///
/// * `Ok(Action)` - Successfully loaded and validated action
/// * `Err(ActionError::Parse)` - The file could not be read or decoded
/// * `Err(ActionError::InvalidAction)` - Validation failed
///
/// # Example
///
/// ```rust,no_run
/// use actionflow::action::load_action;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let action = load_action("action.yaml")?;
///     println!("Loaded {} jobs", action.jobs.len());
///     Ok(())
/// }
/// ```
pub fn load_action(path: impl AsRef<Path>) -> Result<Action> {
    let path = path.as_ref();
    info!("Loading action from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        ActionError::Parse(format!(
            "Failed to read action file '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        ))
    })?;

    debug!("Action content loaded ({} bytes)", content.len());

    let action = parse_action(&content, Format::from_path(path) == Format::Json)?;

    info!(
        "Parsed action '{}': {} jobs, {} steps",
        action.display_id(),
        action.jobs.len(),
        action.step_count()
    );

    Ok(action)
}

/// Saves an action to a file, as JSON for `.json` paths and YAML otherwise.
///
/// # Arguments
///
/// * `action` - The action to save
/// * `path` - Output file path
pub fn save_action(action: &Action, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    let content = match Format::from_path(path) {
        Format::Json => serde_json::to_string_pretty(action)
            .map_err(|e| ActionError::Parse(e.to_string()))?,
        Format::Yaml => {
            serde_yaml::to_string(action).map_err(|e| ActionError::Parse(e.to_string()))?
        }
    };

    fs::write(path, content)?;
    info!("Action saved to: {}", path.display());
    Ok(())
}

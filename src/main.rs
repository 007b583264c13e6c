//! actionflow CLI Entry Point
//!
//! Provides command-line interface for action execution.
//!
//! # Usage
//!
//! ```bash
//! # Execute an action
//! actionflow action.yaml
//!
//! # Supply variables the action does not define itself
//! actionflow action.yaml --var TARGET=release --var VERBOSE=1
//!
//! # Expose the process environment to steps
//! actionflow action.yaml --inherit-env
//!
//! # Cancel the run after 60 seconds
//! actionflow action.yaml --timeout 60
//! ```

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use actionflow::action::load_action;
use actionflow::execution::{Engine, ExecutorOptions};
use actionflow::procedure::ProcedureRegistry;
use actionflow::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    action_path: Option<String>,
    variables: Vec<(String, String)>,
    inherit_env: bool,
    timeout: Option<Duration>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Declarative Action Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: actionflow [OPTIONS] <ACTION_FILE>");
    println!();
    println!("Arguments:");
    println!("  <ACTION_FILE>       Path to action YAML or JSON file");
    println!();
    println!("Options:");
    println!("  --var KEY=VALUE     Supply a variable default (repeatable)");
    println!("  --inherit-env       Expose the process environment to steps");
    println!("  --timeout SECS      Cancel the run after SECS seconds");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  actionflow build.yaml");
    println!("  actionflow build.yaml --var TARGET=release");
    println!("  actionflow deploy.json --inherit-env --timeout 600");
}

/// Splits a `KEY=VALUE` pair.
fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid variable '{}', expected KEY=VALUE", raw)),
    }
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--inherit-env" => {
                config.inherit_env = true;
            }
            "--var" => {
                i += 1;
                if i >= args.len() {
                    return Err("--var requires a KEY=VALUE argument".to_string());
                }
                config.variables.push(parse_variable(&args[i])?);
            }
            "--timeout" => {
                i += 1;
                if i >= args.len() {
                    return Err("--timeout requires a number of seconds".to_string());
                }
                let secs: u64 = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid timeout value: {}", args[i]))?;
                config.timeout = Some(Duration::from_secs(secs));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.action_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.action_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    if config.action_path.is_none() {
        return Err("Missing <ACTION_FILE> argument".to_string());
    }

    Ok(config)
}

/// Cancels `cancel` on Ctrl-C or when the timeout elapses.
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running jobs...");
            token.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Timeout of {:?} reached, cancelling running jobs...", timeout);
            token.cancel();
        });
    }
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let action_path = config.action_path.unwrap_or_default();

    // Load action
    let action = load_action(&action_path).map_err(|e| {
        error!("Failed to load action: {}", e);
        format!("Could not load action from '{}': {}", action_path, e)
    })?;

    info!(
        "Action loaded: {} jobs, {} steps",
        action.jobs.len(),
        action.step_count()
    );

    // Create and configure engine
    let registry = Arc::new(ProcedureRegistry::with_builtins()?);
    info!("Procedures available: {}", registry.names().join(", "));

    let mut options = ExecutorOptions::new().with_runtime_variables(config.variables);
    if config.inherit_env {
        options = options.with_current_environment();
    }

    let mut engine = Engine::new(registry);
    engine.set_options(options);

    // Execute action
    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, config.timeout);

    engine.run_with_cancellation(action, cancel).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("actionflow")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_arguments() {
        let config = parse_arguments(&args(&[
            "action.yaml",
            "--var",
            "A=1",
            "--var",
            "B=x=y",
            "--inherit-env",
            "--timeout",
            "30",
            "-v",
        ]))
        .unwrap();

        assert_eq!(config.action_path.as_deref(), Some("action.yaml"));
        assert_eq!(
            config.variables,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "x=y".to_string())
            ]
        );
        assert!(config.inherit_env);
        assert!(config.verbose);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_arguments_errors() {
        assert!(parse_arguments(&args(&[])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "b.yaml"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--var"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--var", "=1"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--timeout", "soon"])).is_err());
        assert!(parse_arguments(&args(&["a.yaml", "--bogus"])).is_err());
    }

    #[test]
    fn test_parse_variable() {
        assert_eq!(
            parse_variable("KEY=").unwrap(),
            ("KEY".to_string(), String::new())
        );
        assert!(parse_variable("novalue").is_err());
    }
}

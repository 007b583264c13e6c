//! Command Step
//!
//! Runs an external program inside the job's working root. Every argument
//! is expanded first, the step-scope variables are exported as the child's
//! environment, and both output streams are logged line by line, copied to
//! the run's writers and captured into the step's `stdout` and `stderr`
//! outputs. Output that is not valid UTF-8 is captured lossily.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ActionError, Result};

use super::cleanup::Cleanup;
use super::step::{RunnableStep, StepContext};
use super::writer::{write_to, SharedOutput};

/// A literal command payload: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    command: Vec<String>,
}

impl CommandStep {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// The unexpanded command line.
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

#[async_trait]
impl RunnableStep for CommandStep {
    async fn run(
        &self,
        cancel: &CancellationToken,
        sc: &mut StepContext<'_>,
    ) -> Result<Option<Cleanup>> {
        let expanded: Vec<String> = self.command.iter().map(|arg| sc.expand_string(arg)).collect();
        let (program, args) = expanded.split_first().ok_or(ActionError::EmptyCommand)?;

        let root = sc.root()?;
        info!("Executing: {}", expanded.join(" "));
        debug!("Executing in directory: {}", root.display());

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&root)
            .envs(sc.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let writers = sc.writers().clone();
        let stdout_task = child.stdout.take().map(|stream| {
            capture(stream, sc.id().to_string(), "stdout", writers.stdout().clone())
        });
        let stderr_task = child.stderr.take().map(|stream| {
            capture(stream, sc.id().to_string(), "stderr", writers.stderr().clone())
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                warn!("Killing '{}' of step '{}'", program, sc.id());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill '{}': {}", program, e);
                }
                return Err(ActionError::Cancelled);
            }
        };

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        sc.set_output("stdout", stdout);
        sc.set_output("stderr", stderr.clone());

        if status.success() {
            debug!("Step '{}' completed successfully", sc.id());
            return Ok(None);
        }

        error!(
            "Step '{}' failed with exit code: {:?}",
            sc.id(),
            status.code()
        );
        if !stderr.trim().is_empty() {
            error!("stderr:\n{}", stderr);
        }

        Err(ActionError::CommandFailed {
            program: program.clone(),
            code: status.code(),
        })
    }
}

/// Logs each line of `stream`, copies it to `sink` and returns everything
/// it read.
///
/// The stream is read as raw bytes until EOF so the child never sees a
/// closed pipe, whatever it prints.
fn capture<R>(stream: R, step: String, name: &'static str, sink: SharedOutput) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut captured = Vec::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    info!("[{}:{}] {}", step, name, text.trim_end_matches(['\r', '\n']));
                    write_to(&sink, &line);
                    captured.extend_from_slice(&line);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to read {} of step '{}': {}", name, step, e);
                    break;
                }
            }
        }

        String::from_utf8_lossy(&captured).into_owned()
    })
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

//! External tool execution.
//!
//! Every backend talks to its tool through a [`ToolRunner`]. Production code
//! uses [`ProcessRunner`]; tests swap in [`ScriptedRunner`](super::fakes::ScriptedRunner).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::Invocation;

/// A fully specified tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a resolved invocation plus backend-specific arguments.
    pub fn from_invocation(invocation: &Invocation, args: Vec<String>) -> Self {
        Self {
            program: invocation.program.clone(),
            args: invocation.args_with(&args),
        }
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, for tools that pick either stream.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Why a tool process produced no output at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("program not found: {program}")]
    NotFound { program: String },

    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} timed out after {limit_ms}ms")]
    Timeout { program: String, limit_ms: u64 },
}

/// Runs external programs on behalf of the backends.
#[async_trait]
pub trait ToolRunner: Send + Sync + 'static {
    /// Run `command` to completion, giving up after `timeout`.
    ///
    /// A non-zero exit is not an error here: several tools use their exit
    /// status to report a verdict.
    async fn run(&self, command: &ToolCommand, timeout: Duration) -> Result<ToolOutput, ExecError>;

    /// Resolve `program` on the search path.
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// [`ToolRunner`] backed by real OS processes.
///
/// Children are spawned with `kill_on_drop`, so a timed-out or cancelled run
/// never leaves a stray process behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand, timeout: Duration) -> Result<ToolOutput, ExecError> {
        let start = Instant::now();

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExecError::NotFound {
                    program: command.program.clone(),
                },
                _ => ExecError::Spawn {
                    program: command.program.clone(),
                    reason: e.to_string(),
                },
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                program: command.program.clone(),
                limit_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| ExecError::Spawn {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

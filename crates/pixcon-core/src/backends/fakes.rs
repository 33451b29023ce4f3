//! Scripted tool runner (testing only)
//!
//! `ScriptedRunner` answers tool invocations from a list of canned responses
//! and records every command it receives, so backend parsing and engine
//! orchestration can be exercised without any image tooling installed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::exec::{ExecError, ToolCommand, ToolOutput, ToolRunner};

/// Canned reply for a matching command.
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(ToolOutput),
    Error(ExecError),
    /// Sleep for the given duration before answering with empty success.
    /// Honors the caller's timeout like a real process would.
    Hang(Duration),
}

impl Scripted {
    pub fn stdout(exit_code: i32, stdout: &str) -> Self {
        Scripted::Output(ToolOutput {
            exit_code,
            stdout: stdout.to_string(),
            ..ToolOutput::default()
        })
    }

    pub fn stderr(exit_code: i32, stderr: &str) -> Self {
        Scripted::Output(ToolOutput {
            exit_code,
            stderr: stderr.to_string(),
            ..ToolOutput::default()
        })
    }
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    fragments: Vec<String>,
    response: Scripted,
}

impl Rule {
    fn matches(&self, command: &ToolCommand) -> bool {
        command.program == self.program
            && self
                .fragments
                .iter()
                .all(|f| command.args.iter().any(|a| a == f))
    }
}

/// In-memory [`ToolRunner`]. The most recently added matching rule wins.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    installed: Mutex<HashSet<String>>,
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ToolCommand>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `program` as present on the search path and answer its
    /// `--version` probe with `version`.
    pub fn install(&self, program: &str, version: &str) -> &Self {
        self.installed.lock().unwrap().insert(program.to_string());
        self.on(program, &["--version"], Scripted::stdout(0, version))
    }

    /// Answer commands for `program` whose arguments contain every one of
    /// `fragments`.
    pub fn on(&self, program: &str, fragments: &[&str], response: Scripted) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            program: program.to_string(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            response,
        });
        self
    }

    /// Every command run so far, in call order.
    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands run for `program`, excluding version probes.
    pub fn invocations_of(&self, program: &str) -> Vec<ToolCommand> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program && !c.args.iter().any(|a| a == "--version"))
            .collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, command: &ToolCommand, timeout: Duration) -> Result<ToolOutput, ExecError> {
        self.calls.lock().unwrap().push(command.clone());

        if !self.installed.lock().unwrap().contains(&command.program) {
            return Err(ExecError::NotFound {
                program: command.program.clone(),
            });
        }

        let response = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.matches(command))
            .map(|r| r.response.clone());

        match response {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Error(err)) => Err(err),
            Some(Scripted::Hang(delay)) => {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    Err(ExecError::Timeout {
                        program: command.program.clone(),
                        limit_ms: timeout.as_millis() as u64,
                    })
                } else {
                    tokio::time::sleep(delay).await;
                    Ok(ToolOutput::default())
                }
            }
            None => Err(ExecError::Spawn {
                program: command.program.clone(),
                reason: format!("no scripted response for `{command}`"),
            }),
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .lock()
            .unwrap()
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uninstalled_program_is_not_found() {
        let runner = ScriptedRunner::new();
        let err = runner
            .run(&ToolCommand::new("dssim", vec![]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
        assert!(runner.locate("dssim").is_none());
    }

    #[tokio::test]
    async fn test_latest_matching_rule_wins() {
        let runner = ScriptedRunner::new();
        runner
            .install("vips", "vips-8.15.1")
            .on("vips", &["avg"], Scripted::stdout(0, "100"))
            .on("vips", &["avg"], Scripted::stdout(0, "120"));

        let out = runner
            .run(
                &ToolCommand::new("vips", vec!["avg".into(), "a.png".into()]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "120");
        assert_eq!(runner.invocations_of("vips").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_past_timeout_times_out() {
        let runner = ScriptedRunner::new();
        runner
            .install("butteraugli", "")
            .on("butteraugli", &[], Scripted::Hang(Duration::from_secs(30)));

        let err = runner
            .run(
                &ToolCommand::new("butteraugli", vec!["a".into(), "b".into()]),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { limit_ms: 2000, .. }));
    }
}

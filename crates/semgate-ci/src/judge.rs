//! Judge invocation boundary.
//!
//! A judge receives one batch prompt and writes its final answer to a file.
//! Invocation never fails from the caller's point of view: spawn errors and
//! timeouts are folded into a return code and a trace, and the pipeline
//! treats whatever answer file exists (or doesn't) as the run's output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ReasoningEffort;

/// Return code when the judge executable cannot be found.
pub const RC_NOT_FOUND: i32 = 127;
/// Return code when the judge exceeded its timeout and was killed.
pub const RC_TIMEOUT: i32 = 124;
/// Return code for any other spawn or wait failure.
pub const RC_SPAWN_FAILED: i32 = 1;

/// What one invocation produced besides the answer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub rc: i32,
    /// Merged stdout and stderr, or the failure description.
    pub trace: String,
}

impl JudgeOutcome {
    pub fn new(rc: i32, trace: impl Into<String>) -> Self {
        Self {
            rc,
            trace: trace.into(),
        }
    }
}

/// An external oracle that judges one batch prompt.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Run the judge on `prompt`; the final answer is expected at
    /// `answer_path`. Must return within roughly `timeout`.
    async fn invoke(&self, prompt: &str, answer_path: &Path, timeout: Duration) -> JudgeOutcome;
}

// ---------------------------------------------------------------------------
// Codex CLI judge
// ---------------------------------------------------------------------------

/// Settings for [`CodexJudge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeConfig {
    /// Executable to launch.
    pub program: String,
    pub reasoning_effort: ReasoningEffort,
    /// Working root passed to the judge; it only gets read access.
    pub repo_root: PathBuf,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            reasoning_effort: ReasoningEffort::Low,
            repo_root: PathBuf::from("."),
        }
    }
}

/// Judge backed by `codex exec` in a read-only sandbox. The prompt is fed on
/// stdin.
#[derive(Debug, Clone)]
pub struct CodexJudge {
    config: JudgeConfig,
}

impl CodexJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self { config }
    }

    /// Arguments after the program name.
    pub fn command_args(&self, answer_path: &Path) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-c".to_string(),
            format!(
                "model_reasoning_effort=\"{}\"",
                self.config.reasoning_effort
            ),
            "-s".to_string(),
            "read-only".to_string(),
            "-C".to_string(),
            self.config.repo_root.display().to_string(),
            "--output-last-message".to_string(),
            answer_path.display().to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl Judge for CodexJudge {
    async fn invoke(&self, prompt: &str, answer_path: &Path, timeout: Duration) -> JudgeOutcome {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.command_args(answer_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(program = %self.config.program, "judge executable not found");
                return JudgeOutcome::new(
                    RC_NOT_FOUND,
                    format!("{} executable not found", self.config.program),
                );
            }
            Err(e) => {
                warn!(program = %self.config.program, error = %e, "failed to spawn judge");
                return JudgeOutcome::new(RC_SPAWN_FAILED, e.to_string());
            }
        };

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        };

        // The child is moved into the timed future; dropping it on timeout
        // kills the process.
        let run = async { tokio::join!(feed, child.wait_with_output()) };
        match tokio::time::timeout(timeout, run).await {
            Ok((fed, Ok(output))) => {
                if let Err(e) = fed {
                    debug!(error = %e, "judge closed stdin before reading the whole prompt");
                }
                let mut trace = String::from_utf8_lossy(&output.stdout).into_owned();
                trace.push_str(&String::from_utf8_lossy(&output.stderr));
                JudgeOutcome::new(output.status.code().unwrap_or(-1), trace)
            }
            Ok((_, Err(e))) => JudgeOutcome::new(RC_SPAWN_FAILED, e.to_string()),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "judge timed out");
                JudgeOutcome::new(
                    RC_TIMEOUT,
                    format!("judge timed out after {}s", timeout.as_secs()),
                )
            }
        }
    }
}

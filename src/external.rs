//! Bounded external command execution.
//!
//! Validation scripts are collaborators: whatever they do, the caller gets a
//! [`ScriptOutcome`] back. Spawn failures, non-zero exits and timeouts are
//! reported with captured output and never raised.

use serde::Serialize;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScriptOutcome {
    Completed { stdout: String, stderr: String },
    Failed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut { timeout_secs: u64 },
    SpawnFailed { error: String },
}

impl ScriptOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ScriptOutcome::Completed { .. })
    }

    /// One-line description for reports.
    pub fn describe(&self) -> String {
        match self {
            ScriptOutcome::Completed { .. } => "ok".to_string(),
            ScriptOutcome::Failed { exit_code, stderr, .. } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                let detail = stderr.lines().last().unwrap_or("").trim();
                if detail.is_empty() {
                    format!("failed (exit {})", code)
                } else {
                    format!("failed (exit {}): {}", code, detail)
                }
            }
            ScriptOutcome::TimedOut { timeout_secs } => {
                format!("timed out after {}s", timeout_secs)
            }
            ScriptOutcome::SpawnFailed { error } => format!("could not start: {}", error),
        }
    }
}

/// Run `command args...` and wait at most `timeout`. The child is killed on timeout.
pub async fn run_script(command: &str, args: &[String], timeout: Duration) -> ScriptOutcome {
    let mut cmd = Command::new(command);
    cmd.args(args).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(command, error = %e, "failed to start external script");
            return ScriptOutcome::SpawnFailed {
                error: e.to_string(),
            };
        }
        Err(_) => {
            tracing::warn!(command, secs = timeout.as_secs(), "external script timed out");
            return ScriptOutcome::TimedOut {
                timeout_secs: timeout.as_secs(),
            };
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        ScriptOutcome::Completed { stdout, stderr }
    } else {
        tracing::warn!(command, status = %output.status, "external script failed");
        ScriptOutcome::Failed {
            exit_code: output.status.code(),
            stdout,
            stderr,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let outcome = run_script("sh", &sh("echo hello"), Duration::from_secs(10)).await;
        match outcome {
            ScriptOutcome::Completed { stdout, .. } => assert_eq!(stdout.trim(), "hello"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let outcome = run_script("sh", &sh("echo broken >&2; exit 3"), Duration::from_secs(10)).await;
        assert!(!outcome.succeeded());
        assert_eq!(outcome.describe(), "failed (exit 3): broken");
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let outcome = run_script("sh", &sh("sleep 5"), Duration::from_millis(100)).await;
        assert_eq!(outcome, ScriptOutcome::TimedOut { timeout_secs: 0 });
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let outcome = run_script("kb-definitely-not-installed", &[], Duration::from_secs(1)).await;
        assert!(matches!(outcome, ScriptOutcome::SpawnFailed { .. }));
    }
}

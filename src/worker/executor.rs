use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use crate::client::FailureReason;
use crate::config::ExecutorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of running a query command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    /// Standard output with leading and trailing whitespace removed.
    /// Populated on failure too, with whatever the process wrote before exiting.
    pub output: String,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// `ExecutionFailed` when the process could not be spawned or was killed
    /// by a signal. A plain non-zero exit is not a failure here: grep reports
    /// "no match" that way.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match (self.status, self.exit_code) {
            (ExecutionStatus::Failed, None) => Some(FailureReason::ExecutionFailed),
            _ => None,
        }
    }
}

/// Runs query command lines through a shell on the worker.
///
/// The command line is handed to `<shell> -c` unmodified, so shell operators
/// inside the query are interpreted. Standard input is closed, which keeps a
/// `grep` without file arguments from blocking on the server's stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute a command line and capture its trimmed standard output
    pub async fn execute(&self, command: &str) -> ExecutionResult {
        tracing::debug!(command, shell = %self.config.shell, "Executing query");

        let result = Command::new(&self.config.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        Self::process_output(command, result)
    }

    fn process_output(
        command: &str,
        result: Result<std::process::Output, std::io::Error>,
    ) -> ExecutionResult {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let exit_code = output.status.code();

                let (status, error) = if output.status.success() {
                    (ExecutionStatus::Completed, None)
                } else {
                    let error = if stderr.is_empty() {
                        format!("Exit code: {:?}", exit_code)
                    } else {
                        stderr
                    };
                    // grep exits 1 on "no match", so this stays a warning
                    tracing::warn!(
                        command,
                        exit_code = ?exit_code,
                        error = %error,
                        "Could not run command"
                    );
                    (ExecutionStatus::Failed, Some(error))
                };

                ExecutionResult {
                    status,
                    exit_code,
                    output: stdout,
                    error,
                }
            }
            Err(e) => {
                tracing::error!(command, error = %e, "Failed to spawn command");
                ExecutionResult {
                    status: ExecutionStatus::Failed,
                    exit_code: None,
                    output: String::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

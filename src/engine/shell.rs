//! Engine that runs `E, Shell, <command line>` records through the system shell

use async_trait::async_trait;

use crate::record::{RecordStatus, StatusCode, TestRecord};

use super::RecordProcessor;

/// Record command this engine answers to
const SHELL_COMMAND: &str = "Shell";

/// Runs shell records; leaves every other record untouched
#[derive(Debug, Default, Clone)]
pub struct ShellEngine;

impl ShellEngine {
    pub fn new() -> Self {
        Self
    }

    fn accepts(record: &TestRecord) -> bool {
        record
            .command()
            .is_some_and(|c| c.eq_ignore_ascii_case(SHELL_COMMAND))
    }
}

#[async_trait]
impl RecordProcessor for ShellEngine {
    async fn process(&mut self, record: &mut TestRecord) {
        if !Self::accepts(record) {
            return;
        }

        let command_line = record.fields_from(2).join(" ");
        if command_line.trim().is_empty() {
            record.set_status(RecordStatus::failure("no command line given"));
            return;
        }

        tracing::debug!(record = %record.location(), "$ {}", command_line);
        let output = if cfg!(windows) {
            tokio::process::Command::new("cmd")
                .args(["/C", &command_line])
                .output()
                .await
        } else {
            tokio::process::Command::new("sh")
                .args(["-c", &command_line])
                .output()
                .await
        };

        let status = match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                RecordStatus::ok(if stdout.is_empty() { "ok".to_string() } else { stdout })
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                RecordStatus::failure(format!("exit code {}: {}", code, stderr.trim()))
            }
            Err(e) => RecordStatus::new(
                StatusCode::INVALID_FILE_IO,
                format!("Failed to run command: {}", e),
            ),
        };
        record.set_status(status);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn run(line: &str) -> RecordStatus {
        let mut record = TestRecord::new(line, ",");
        ShellEngine::new().process(&mut record).await;
        record.status
    }

    #[tokio::test]
    async fn test_success_reports_stdout() {
        let status = run("E, Shell, echo, hello").await;
        assert_eq!(status.code, StatusCode::NO_SCRIPT_FAILURE);
        assert_eq!(status.message, "hello");
    }

    #[tokio::test]
    async fn test_silent_success_reports_ok() {
        let status = run("E, shell, true").await;
        assert_eq!(status, RecordStatus::ok("ok"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let status = run("E, Shell, echo oops >&2; exit 3").await;
        assert_eq!(status.code, StatusCode::GENERAL_SCRIPT_FAILURE);
        assert_eq!(status.message, "exit code 3: oops");
    }

    #[tokio::test]
    async fn test_other_records_are_not_executed() {
        let status = run("T, Login, OK, Click").await;
        assert_eq!(status.code, StatusCode::SCRIPT_NOT_EXECUTED);
        let status = run("E, Launch, app").await;
        assert_eq!(status.code, StatusCode::SCRIPT_NOT_EXECUTED);
    }

    #[tokio::test]
    async fn test_empty_command_line_fails() {
        let status = run("E, Shell").await;
        assert_eq!(status.code, StatusCode::GENERAL_SCRIPT_FAILURE);
    }
}

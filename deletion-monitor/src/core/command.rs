/*!
Invocation of external tools (`auditctl`, `ausearch`, `id`)
*/

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::core::error::{MonitorError, Result};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs.
///
/// An `Err` means the program could not be run at all (missing binary,
/// timeout). A program that ran and failed is an `Ok` with `success == false`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs programs on the host with a per-invocation timeout
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("Running {} {}", program, args.join(" "));

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| MonitorError::Command {
            program: program.to_string(),
            reason: format!("timed out after {:?}", self.timeout),
        })?
        .map_err(|e| MonitorError::Command {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        let result = runner.run("definitely-not-a-real-binary-7f3a", &[]).await;
        assert!(matches!(result, Err(MonitorError::Command { .. })));
    }

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        let output = runner.run("sh", &["-c", "echo hello; exit 3"]).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
    }
}

use std::process::{Output, Stdio};

use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{ModuleError, ModuleResult};

/// Captured result of an external program run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stdout followed by trimmed stderr.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Abstraction over external command execution (avrdude).
/// This allows mocking the flashing tool in tests.
///
/// Arguments are passed as a list; nothing goes through a shell.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a program to completion, blocking the calling thread.
    fn execute(&self, program: &str, args: Vec<String>) -> ModuleResult<CommandOutput>;

    /// Run a program as a child process, suspending the calling task until
    /// its output is drained and it has exited.
    async fn execute_async(&self, program: &str, args: Vec<String>) -> ModuleResult<CommandOutput>;
}

/// Real implementation backed by `std::process` and `tokio::process`.
#[derive(Default)]
pub struct RealCommandExecutor;

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, program: &str, args: Vec<String>) -> ModuleResult<CommandOutput> {
        let output = std::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(program, e))?;
        debug!("{} exited with {:?}", program, output.status.code());
        Ok(output.into())
    }

    async fn execute_async(&self, program: &str, args: Vec<String>) -> ModuleResult<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| spawn_error(program, e))?;
        debug!("{} exited with {:?}", program, output.status.code());
        Ok(output.into())
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> ModuleError {
    ModuleError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    }
}

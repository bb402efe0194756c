use anyhow::{Context, Result};
use std::process::{Command, Output};

/// Captured result of a shell command
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub success: bool,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for ShellOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Run a command line through `sh -c` and capture its output
///
/// A non-zero exit is not an error here; only failing to start the shell is.
pub fn run_shell(command_line: &str) -> Result<ShellOutput> {
    log::debug!("sh -c {command_line}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .output()
        .with_context(|| format!("Failed to execute: {command_line}"))?;
    Ok(output.into())
}

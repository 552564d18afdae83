//! Subprocess execution with a deadline.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::timeout;

/// Why a subprocess did not produce output
#[derive(Debug)]
pub enum ProcessFailure {
    /// Could not be started (usually: binary not found)
    Spawn(std::io::Error),

    /// Deadline passed; the child has been killed
    TimedOut(Duration),
}

/// Run a command to completion, killing it if `deadline` passes.
///
/// stdin is closed; stdout and stderr are captured.
pub async fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
) -> Result<Output, ProcessFailure> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(ProcessFailure::Spawn)?;

    // Dropping the future on timeout drops the child, which kills it
    match timeout(deadline, child.wait_with_output()).await {
        Ok(result) => result.map_err(ProcessFailure::Spawn),
        Err(_) => Err(ProcessFailure::TimedOut(deadline)),
    }
}

/// Stderr as trimmed, lossy UTF-8
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Check a binary is reachable by running it with a version flag
pub async fn check_binary(binary: &str, version_flag: impl AsRef<OsStr>) -> Result<()> {
    let output = Command::new(binary)
        .arg(version_flag)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run '{}'", binary))?;

    if !output.status.success() {
        anyhow::bail!(
            "'{}' exited with code {}: {}",
            binary,
            output.status.code().unwrap_or(-1),
            stderr_text(&output)
        );
    }

    Ok(())
}

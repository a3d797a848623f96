//! Local command execution for CLI-backed providers

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::traits::ProviderError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Run `program args...` and return its stdout as UTF-8 (lossy)
///
/// A non-zero exit with empty stdout is an error carrying stderr; otherwise
/// stdout is returned even on non-zero exit, since some tools report partial
/// results that way.
pub async fn run(program: &str, args: &[&str]) -> Result<String, ProviderError> {
    let command_line = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    debug!(command = %command_line, "Running command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(COMMAND_TIMEOUT, child)
        .await
        .map_err(|_| ProviderError::Command {
            command: command_line.clone(),
            reason: format!("timed out after {}s", COMMAND_TIMEOUT.as_secs()),
        })?
        .map_err(|e| ProviderError::Command {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    if !output.status.success() && stdout.trim().is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProviderError::Command {
            command: command_line,
            reason: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    Ok(stdout)
}

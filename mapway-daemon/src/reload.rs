//! Load balancer reload trigger, run once after the table file is seeded.

use tokio::process::Command;

use crate::error::{io_err, DaemonError};

/// Run `command` through `sh -c` and return its trimmed stdout.
///
/// A non-zero exit status is an error carrying the status and stderr.
pub async fn trigger_reload(command: &str) -> Result<String, DaemonError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|e| io_err("sh", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DaemonError::Reload {
            command: command.to_string(),
            detail: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

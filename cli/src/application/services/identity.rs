//! Device identity resolution.

use std::time::Duration;

use outpost_common::IdentityConfig;

use crate::application::ports::RemoteShell;
use crate::domain::{DeviceIdentity, ProvisionError};

/// Run the identity command on the device and normalize its first
/// non-empty line.
///
/// # Errors
///
/// `IdentityUnavailable` when the command fails or prints nothing usable.
/// Transport errors pass through unchanged.
pub async fn resolve_identity(
    shell: &impl RemoteShell,
    config: &IdentityConfig,
) -> Result<DeviceIdentity, ProvisionError> {
    let output = shell
        .execute(&config.command, Duration::from_secs(config.timeout_secs))
        .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::IdentityUnavailable(format!(
            "`{}` exited with {}: {}",
            config.command,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    DeviceIdentity::from_command_output(&String::from_utf8_lossy(&output.stdout))
}

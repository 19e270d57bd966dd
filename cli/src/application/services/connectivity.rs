//! Internet reachability check run from the device itself.

use std::time::Duration;

use outpost_common::ConnectivityConfig;

use crate::application::ports::RemoteShell;
use crate::domain::ProvisionError;
use crate::domain::shell::shell_quote;

/// Slack on top of the probe's own timeout for the ssh round trip.
const TRANSPORT_SLACK: Duration = Duration::from_secs(5);

/// The remote probe: the configured command, or a single ping.
#[must_use]
pub fn probe_command(config: &ConnectivityConfig) -> String {
    config.command.clone().unwrap_or_else(|| {
        format!(
            "ping -c 1 -W {} {}",
            config.timeout_secs,
            shell_quote(&config.host)
        )
    })
}

/// Probe the external endpoint from the device. Returns the command that
/// succeeded.
///
/// # Errors
///
/// `ConnectivityTimeout` when the probe fails or does not answer in time.
/// `ChannelClosed` passes through unchanged.
pub async fn verify_connectivity(
    shell: &impl RemoteShell,
    config: &ConnectivityConfig,
) -> Result<String, ProvisionError> {
    let command = probe_command(config);
    let timeout = Duration::from_secs(config.timeout_secs) + TRANSPORT_SLACK;
    let output = match shell.execute(&command, timeout).await {
        Ok(output) => output,
        Err(ProvisionError::CommandTimeout { .. }) => {
            return Err(ProvisionError::ConnectivityTimeout(format!(
                "`{command}` did not answer within {}s",
                timeout.as_secs()
            )));
        }
        Err(e) => return Err(e),
    };
    if output.status.success() {
        Ok(command)
    } else {
        Err(ProvisionError::ConnectivityTimeout(format!(
            "`{command}` exited with {}",
            output.status.code().unwrap_or(-1)
        )))
    }
}

//! WAN/LAN reconfiguration through `uci`.
//!
//! Reads the current settings, applies only the difference, commits,
//! schedules a detached reload and reads back. A successful `uci` exit is not
//! taken as proof: the read-back decides.

use std::time::Duration;

use outpost_common::NetworkConfig;
use tracing::{debug, info};

use crate::application::ports::RemoteShell;
use crate::domain::network::{
    self, COMMIT_COMMAND, DesiredOption, UciChange, UciSettings, desired_options, plan,
};
use crate::domain::shell::detached;
use crate::domain::{AuthorizedDevice, ProvisionError};

/// What the configurator changed. Empty `changes` means the device already
/// had the desired settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkReport {
    pub changes: Vec<UciChange>,
}

impl NetworkReport {
    #[must_use]
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            "network already configured".to_string()
        } else {
            let list: Vec<String> = self.changes.iter().map(ToString::to_string).collect();
            format!("applied {} change(s): {}", self.changes.len(), list.join(", "))
        }
    }
}

/// Bring the device's network settings to `config`.
///
/// Requires an [`AuthorizedDevice`]: this stage changes device state.
///
/// # Errors
///
/// `ConfigurationVerificationFailed` when a `uci` command is refused or the
/// read-back differs from the desired settings. Transport errors pass
/// through unchanged.
pub async fn configure_network(
    shell: &impl RemoteShell,
    device: &AuthorizedDevice,
    config: &NetworkConfig,
) -> Result<NetworkReport, ProvisionError> {
    let timeout = Duration::from_secs(config.command_timeout_secs);
    let desired = desired_options(config);

    let current = read_settings(shell, &desired, timeout).await?;
    let changes = plan(&desired, &current);
    if changes.is_empty() {
        info!(device = %device.identity(), "network settings already match");
        return Ok(NetworkReport { changes });
    }

    for change in &changes {
        debug!(%change, "applying");
        run_checked(shell, &change.command(), timeout).await?;
    }
    run_checked(shell, COMMIT_COMMAND, timeout).await?;
    run_checked(shell, &detached(&config.reload_command), timeout).await?;

    let readback = read_settings(shell, &desired, timeout).await?;
    let mismatches = network::verify(&desired, &readback);
    if !mismatches.is_empty() {
        return Err(ProvisionError::ConfigurationVerificationFailed(
            mismatches.join("; "),
        ));
    }
    info!(device = %device.identity(), changes = changes.len(), "network reconfigured");
    Ok(NetworkReport { changes })
}

async fn read_settings(
    shell: &impl RemoteShell,
    desired: &[DesiredOption],
    timeout: Duration,
) -> Result<UciSettings, ProvisionError> {
    let mut settings = UciSettings::new();
    for section in network::sections(desired) {
        // A missing section exits non-zero with no output; treat as empty.
        let output = shell.execute(&network::show_command(&section), timeout).await?;
        settings.extend(network::parse_show(&String::from_utf8_lossy(&output.stdout)));
    }
    Ok(settings)
}

async fn run_checked(
    shell: &impl RemoteShell,
    command: &str,
    timeout: Duration,
) -> Result<(), ProvisionError> {
    let output = shell.execute(command, timeout).await?;
    if output.status.success() {
        return Ok(());
    }
    Err(ProvisionError::ConfigurationVerificationFailed(format!(
        "`{command}` exited with {}: {}",
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

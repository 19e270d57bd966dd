//! Infrastructure payload deployment.
//!
//! The install command is opaque: it is started detached and reports its
//! exit code through a remote status file, which is polled until it settles
//! or the deadline passes. A status of `0` with a matching payload checksum
//! makes the whole stage a no-op; `running` resumes polling.

use std::time::Duration;

use outpost_common::DeployConfig;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::application::cancel::CancelToken;
use crate::application::ports::RemoteShell;
use crate::domain::deploy::{
    DeployStatus, Payload, checksum_command, parse_checksum, status_command, trigger_command,
};
use crate::domain::{AuthorizedDevice, ProvisionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// A previous run already installed this payload.
    AlreadyDeployed,
    /// An install was running; polled it to completion.
    Resumed,
    /// Triggered a fresh install.
    Installed { uploaded: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub outcome: DeployOutcome,
    pub sha256: Option<String>,
}

impl DeployReport {
    #[must_use]
    pub fn summary(&self) -> String {
        let what = match self.outcome {
            DeployOutcome::AlreadyDeployed => "already deployed",
            DeployOutcome::Resumed => "resumed running install",
            DeployOutcome::Installed { uploaded: true } => "uploaded and installed",
            DeployOutcome::Installed { uploaded: false } => "installed",
        };
        match &self.sha256 {
            Some(sha) => format!("{what} (sha256 {sha})"),
            None => what.to_string(),
        }
    }
}

/// Stage deadline for a deploy that starts now.
#[must_use]
pub fn stage_deadline(config: &DeployConfig) -> Instant {
    Instant::now() + Duration::from_secs(config.deadline_secs)
}

/// Deploy the payload and run the install command.
///
/// Requires an [`AuthorizedDevice`]: this stage changes device state.
/// Cancellation is honoured between status polls. `deadline` bounds the whole
/// stage, so a retried attempt keeps the deadline of the first one.
///
/// # Errors
///
/// `DeploymentFailed` on checksum mismatch, a non-zero install exit code, an
/// unreadable status file or an expired poll deadline. `Cancelled` when
/// cancellation is requested while polling. Transport errors pass through.
pub async fn deploy(
    shell: &impl RemoteShell,
    device: &AuthorizedDevice,
    config: &DeployConfig,
    payload: Option<&Payload>,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<DeployReport, ProvisionError> {
    let timeout = Duration::from_secs(config.command_timeout_secs);
    let sha256 = payload.map(|p| p.sha256().to_string());

    let status = read_status(shell, config, timeout).await?;
    debug!(?status, "remote deploy status");
    let remote_matches = match payload {
        Some(p) => remote_checksum(shell, &config.remote_path, timeout).await?.as_deref()
            == Some(p.sha256()),
        None => true,
    };

    match status {
        DeployStatus::Succeeded if remote_matches => {
            info!(device = %device.identity(), "payload already deployed");
            return Ok(DeployReport {
                outcome: DeployOutcome::AlreadyDeployed,
                sha256,
            });
        }
        DeployStatus::Running if remote_matches => {
            info!(device = %device.identity(), "install already running, polling");
            poll(shell, config, timeout, deadline, cancel).await?;
            return Ok(DeployReport {
                outcome: DeployOutcome::Resumed,
                sha256,
            });
        }
        _ => {}
    }

    let mut uploaded = false;
    if let Some(p) = payload {
        if !remote_matches {
            info!(bytes = p.len(), path = %config.remote_path, "uploading payload");
            shell.upload(p.bytes(), &config.remote_path, timeout).await?;
            uploaded = true;
        }
        let remote = remote_checksum(shell, &config.remote_path, timeout).await?;
        if remote.as_deref() != Some(p.sha256()) {
            return Err(ProvisionError::DeploymentFailed(format!(
                "checksum mismatch for {}: expected {}, found {}",
                config.remote_path,
                p.sha256(),
                remote.as_deref().unwrap_or("nothing")
            )));
        }
    }

    let trigger = trigger_command(&config.install_command, &config.status_file);
    let output = shell.execute(&trigger, timeout).await?;
    if !output.status.success() {
        return Err(ProvisionError::DeploymentFailed(format!(
            "could not start install command: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    info!(device = %device.identity(), "install started");

    poll(shell, config, timeout, deadline, cancel).await?;
    Ok(DeployReport {
        outcome: DeployOutcome::Installed { uploaded },
        sha256,
    })
}

async fn read_status(
    shell: &impl RemoteShell,
    config: &DeployConfig,
    timeout: Duration,
) -> Result<DeployStatus, ProvisionError> {
    let output = shell
        .execute(&status_command(&config.status_file), timeout)
        .await?;
    Ok(DeployStatus::parse(&String::from_utf8_lossy(&output.stdout)))
}

async fn remote_checksum(
    shell: &impl RemoteShell,
    remote_path: &str,
    timeout: Duration,
) -> Result<Option<String>, ProvisionError> {
    let output = shell.execute(&checksum_command(remote_path), timeout).await?;
    Ok(parse_checksum(&String::from_utf8_lossy(&output.stdout)))
}

async fn poll(
    shell: &impl RemoteShell,
    config: &DeployConfig,
    timeout: Duration,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<(), ProvisionError> {
    let interval = Duration::from_millis(config.poll_interval_ms);
    loop {
        match read_status(shell, config, timeout).await? {
            DeployStatus::Succeeded => return Ok(()),
            DeployStatus::Running => {}
            DeployStatus::Failed(code) => {
                return Err(ProvisionError::DeploymentFailed(format!(
                    "install command exited with {code}"
                )));
            }
            DeployStatus::Absent => {
                return Err(ProvisionError::DeploymentFailed(format!(
                    "status file {} disappeared",
                    config.status_file
                )));
            }
            DeployStatus::Unknown(s) => {
                return Err(ProvisionError::DeploymentFailed(format!(
                    "unexpected status {s:?} in {}",
                    config.status_file
                )));
            }
        }
        if Instant::now() + interval > deadline {
            return Err(ProvisionError::DeploymentFailed(format!(
                "install did not finish within {}s",
                config.deadline_secs
            )));
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel.cancelled() => return Err(ProvisionError::Cancelled),
        }
    }
}

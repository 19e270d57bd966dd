//! Payload deployment: upload, checksum, trigger, poll.

use std::process::Output;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use outpost_cli::application::services::deploy::{DeployOutcome, deploy, stage_deadline};
use outpost_cli::application::{CancelToken, RemoteShell, RetryPolicy};
use outpost_cli::domain::ProvisionError;
use outpost_cli::domain::deploy::Payload;
use outpost_common::{DeployConfig, ErrorKind};
use tokio::time::Instant;

use crate::helpers::{FakeDevice, PAYLOAD, authorized, ok_output};

const REMOTE: &str = "/tmp/outpost-payload";

fn deploy_config() -> DeployConfig {
    serde_yaml::from_str("install_command: sh /tmp/outpost-payload\npoll_interval_ms: 10\ndeadline_secs: 5\n")
        .unwrap()
}

fn payload() -> Payload {
    Payload::new(PAYLOAD.to_vec())
}

#[tokio::test]
async fn fresh_device_gets_upload_and_install() {
    let device = FakeDevice::new();
    let config = deploy_config();
    let report = deploy(
        &device.shell(),
        &authorized(),
        &config,
        Some(&payload()),
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, DeployOutcome::Installed { uploaded: true });
    assert_eq!(report.sha256.as_deref(), Some(payload().sha256()));
    let state = device.state();
    assert_eq!(state.files[REMOTE], PAYLOAD);
    assert_eq!(state.uploads, 1);
    assert_eq!(state.triggers, 1);
    assert_eq!(state.status.as_deref(), Some("0"));
}

#[tokio::test]
async fn redeploying_the_same_payload_is_a_no_op() {
    let device = FakeDevice::new();
    let shell = device.shell();
    let config = deploy_config();
    let cancel = CancelToken::new();
    let device_auth = authorized();
    let payload = payload();
    deploy(&shell, &device_auth, &config, Some(&payload), stage_deadline(&config), &cancel)
        .await
        .unwrap();

    let report = deploy(&shell, &device_auth, &config, Some(&payload), stage_deadline(&config), &cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeployOutcome::AlreadyDeployed);
    let state = device.state();
    assert_eq!(state.uploads, 1);
    assert_eq!(state.triggers, 1);
}

#[tokio::test]
async fn running_install_is_resumed_without_retrigger() {
    let device = FakeDevice::with(|d| {
        d.files.insert(REMOTE.into(), PAYLOAD.to_vec());
        d.status = Some("running".into());
        d.pending_polls = 2;
    });
    let config = deploy_config();
    let report = deploy(
        &device.shell(),
        &authorized(),
        &config,
        Some(&payload()),
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, DeployOutcome::Resumed);
    let state = device.state();
    assert_eq!(state.triggers, 0);
    assert_eq!(state.uploads, 0);
}

#[tokio::test]
async fn changed_payload_is_uploaded_again() {
    let device = FakeDevice::with(|d| {
        d.files.insert(REMOTE.into(), b"old build".to_vec());
        d.status = Some("0".into());
    });
    let config = deploy_config();
    let report = deploy(
        &device.shell(),
        &authorized(),
        &config,
        Some(&payload()),
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, DeployOutcome::Installed { uploaded: true });
    assert_eq!(device.state().files[REMOTE], PAYLOAD);
}

#[tokio::test]
async fn install_without_payload_only_triggers() {
    let device = FakeDevice::new();
    let config = deploy_config();
    let report = deploy(
        &device.shell(),
        &authorized(),
        &config,
        None,
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, DeployOutcome::Installed { uploaded: false });
    assert_eq!(report.summary(), "installed");
    assert_eq!(device.state().uploads, 0);
}

#[tokio::test]
async fn non_zero_install_exit_fails() {
    let device = FakeDevice::with(|d| d.install_exit = 3);
    let config = deploy_config();
    let err = deploy(
        &device.shell(),
        &authorized(),
        &config,
        Some(&payload()),
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeploymentFailed);
    assert!(err.to_string().contains("exited with 3"), "{err}");
}

#[tokio::test(start_paused = true)]
async fn poll_deadline_fails_the_stage() {
    let device = FakeDevice::with(|d| d.install_polls = u32::MAX);
    let mut config = deploy_config();
    config.deadline_secs = 1;
    config.poll_interval_ms = 100;

    let err = deploy(
        &device.shell(),
        &authorized(),
        &config,
        None,
        stage_deadline(&config),
        &CancelToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeploymentFailed);
    assert!(err.to_string().contains("did not finish within 1s"), "{err}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_polling() {
    let device = FakeDevice::with(|d| d.install_polls = u32::MAX);
    let shell = device.shell();
    let device_auth = authorized();
    let config = deploy_config();
    let cancel = CancelToken::new();

    let (result, ()) = tokio::join!(
        deploy(&shell, &device_auth, &config, None, stage_deadline(&config), &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(55)).await;
            cancel.cancel();
        }
    );

    assert_eq!(result.unwrap_err(), ProvisionError::Cancelled);
    assert_eq!(device.state().triggers, 1);
}

/// An install that never finishes, behind a link that drops some status reads.
struct StuckInstall {
    status_reads: AtomicU32,
    timeout_on: &'static [u32],
}

impl RemoteShell for StuckInstall {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<Output, ProvisionError> {
        if !command.starts_with("cat ") {
            return Ok(ok_output(b""));
        }
        let read = self.status_reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.timeout_on.contains(&read) {
            return Err(ProvisionError::CommandTimeout {
                command: command.to_string(),
                timeout,
            });
        }
        Ok(ok_output(b"running\n"))
    }

    async fn upload(&self, _: &[u8], _: &str, _: Duration) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProvisionError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn retried_attempts_share_one_stage_deadline() {
    let shell = StuckInstall {
        status_reads: AtomicU32::new(0),
        timeout_on: &[5, 9],
    };
    let device = authorized();
    let mut config = deploy_config();
    config.deadline_secs = 1;
    config.poll_interval_ms = 100;
    let cancel = CancelToken::new();

    let started = Instant::now();
    let deadline = stage_deadline(&config);
    let attempted = RetryPolicy::new(3, Duration::from_millis(10))
        .execute(&cancel, || deploy(&shell, &device, &config, None, deadline, &cancel))
        .await;

    assert_eq!(attempted.attempts, 3);
    let err = attempted.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeploymentFailed);
    assert!(err.to_string().contains("did not finish within 1s"), "{err}");
    assert!(
        started.elapsed() <= Duration::from_secs(1),
        "stage ran for {:?}",
        started.elapsed()
    );
}

//! `outpost provision` — run one provisioning session against the target.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use outpost_common::{ErrorKind, TerminalStatus};
use tokio::sync::mpsc;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::{CancelToken, SessionPlan, StageOrchestrator};
use crate::commands::session_watch::observe;
use crate::infra::audit::FileAuditLog;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{
    TargetOverrides, YamlConfigStore, audit_dir, known_hosts, load_payload, resolve_target,
};
use crate::infra::ssh::SshTransport;

/// Arguments for the provision command.
#[derive(Args, Default)]
pub struct ProvisionArgs {
    /// Configuration file (default: $OUTPOST_CONFIG or ~/.outpost/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override target.address
    #[arg(long)]
    pub address: Option<String>,

    /// Override target.port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override target.user
    #[arg(long)]
    pub user: Option<String>,
}

/// Run `outpost provision`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the session does not
/// complete.
pub async fn run(args: ProvisionArgs, app: &AppContext) -> Result<()> {
    let store = YamlConfigStore::new(args.config).with_overrides(TargetOverrides {
        address: args.address,
        port: args.port,
        user: args.user,
    });
    let config = store.load()?;

    let target = resolve_target(&config.target)?;
    let payload = match &config.deploy {
        Some(deploy) => load_payload(deploy, &store.base_dir()?)?,
        None => None,
    };
    let plan = SessionPlan::from_config(&config, payload)?;
    let known_hosts = known_hosts(&config.target)?;
    known_hosts.ensure()?;
    let audit = FileAuditLog::new(audit_dir(&config)?);

    if !app.confirm(
        &format!("Provision the device at {}?", target.display_name()),
        true,
    )? {
        app.output.info("Aborted.");
        return Ok(());
    }

    let transport = SshTransport::new(
        TokioCommandRunner::default(),
        known_hosts.path().to_path_buf(),
        Duration::from_secs(config.target.connect_timeout_secs),
    );
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator =
        StageOrchestrator::new(&transport, &audit, &plan, cancel.clone()).with_events(tx);

    let renderer = app.renderer();
    let abandon = CancelToken::new();
    let (report, ()) = tokio::join!(
        async {
            tokio::select! {
                report = orchestrator.run(&target) => Some(report),
                () = abandon.cancelled() => None,
            }
        },
        observe(app, &renderer, rx, &cancel, &abandon)
    );
    // Dropping the session kills the in-flight command and stops the master.
    let Some(report) = report else {
        return Err(SessionFailed {
            kind: ErrorKind::Cancelled,
            message: "provisioning interrupted mid-stage".to_string(),
        }
        .into());
    };
    renderer
        .render_report(&report)
        .context("rendering session report")?;

    match report.status {
        TerminalStatus::Completed => Ok(()),
        TerminalStatus::Cancelled => Err(SessionFailed {
            kind: ErrorKind::Cancelled,
            message: "provisioning cancelled".to_string(),
        }
        .into()),
        TerminalStatus::Failed { kind, message, .. } => Err(SessionFailed { kind, message }.into()),
    }
}

/// A session that ended without completing. `kind` becomes the error code of
/// `--json` output.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SessionFailed {
    pub kind: ErrorKind,
    pub message: String,
}

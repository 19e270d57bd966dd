//! `outpost audit` — inspect past provisioning sessions.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::domain::DeviceIdentity;
use crate::domain::audit::LogEntry;
use crate::infra::audit::{default_audit_dir, list_logs, read_log};
use crate::infra::config::{YamlConfigStore, audit_dir};

/// Audit subcommands.
#[derive(Subcommand)]
pub enum AuditCommand {
    /// List audit logs, newest first
    List(AuditDirArgs),

    /// Show the records of one audit log
    Show(ShowArgs),
}

/// Where to look for audit logs.
#[derive(Args, Default)]
pub struct AuditDirArgs {
    /// Audit directory (default: audit.dir from the configuration, then ~/.outpost/audit)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Configuration file to take audit.dir from
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `outpost audit show`.
#[derive(Args)]
pub struct ShowArgs {
    /// Log file path, file name, or hardware id (newest session for that device)
    pub log: String,

    #[command(flatten)]
    pub location: AuditDirArgs,
}

/// Run an audit subcommand.
///
/// # Errors
///
/// Returns an error if the audit directory cannot be read or the requested
/// log does not exist.
pub fn run(cmd: AuditCommand, app: &AppContext) -> Result<()> {
    match cmd {
        AuditCommand::List(args) => {
            let dir = resolve_dir(&args)?;
            let logs = list_logs(&dir)?;
            app.renderer().render_logs(&dir, &logs)
        }
        AuditCommand::Show(args) => {
            let dir = resolve_dir(&args.location)?;
            let path = find_log(&dir, &args.log)?;
            let records = read_log(&path)?;
            app.renderer().render_log(&path, &records)
        }
    }
}

/// `--dir`, else `audit.dir` from a readable configuration, else the default.
fn resolve_dir(args: &AuditDirArgs) -> Result<PathBuf> {
    if let Some(dir) = &args.dir {
        return Ok(dir.clone());
    }
    let store = YamlConfigStore::new(args.config.clone());
    match store.read() {
        Ok(config) => audit_dir(&config),
        // An explicit file that cannot be read is an error; a missing default is not.
        Err(e) if args.config.is_some() => Err(e),
        Err(_) => default_audit_dir(),
    }
}

/// Resolve `wanted` as a path, a file name inside `dir`, or a hardware id.
fn find_log(dir: &Path, wanted: &str) -> Result<PathBuf> {
    let as_path = Path::new(wanted);
    if as_path.is_file() {
        return Ok(as_path.to_path_buf());
    }
    let in_dir = dir.join(wanted);
    if in_dir.is_file() {
        return Ok(in_dir);
    }
    if let Some(id) = DeviceIdentity::normalize(wanted)
        && let Some(entry) = newest_for(&list_logs(dir)?, &id)
    {
        return Ok(entry.path.clone());
    }
    bail!("no audit log matching {wanted:?} in {}", dir.display())
}

fn newest_for<'a>(logs: &'a [LogEntry], id: &DeviceIdentity) -> Option<&'a LogEntry> {
    // `list_logs` is sorted newest first.
    logs.iter().find(|entry| entry.device == id.as_str())
}

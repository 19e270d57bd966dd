//! File-backed audit log (one JSON-lines file per session).
//!
//! The file is created as `UNIDENTIFIED_{ts}.log` by the `session_started`
//! record and renamed to `{hardwareId}_{ts}.log` once the device identity is
//! known. Every record is flushed to stable storage before `append` returns.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use outpost_common::AuditRecord;

use crate::application::ports::AuditSink;
use crate::domain::DeviceIdentity;
use crate::domain::audit::{LogEntry, log_file_name, parse_log_file_name};

/// Default audit directory: `~/.outpost/audit`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_audit_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".outpost").join("audit"))
}

const MAX_NAME_COLLISIONS: u32 = 1000;

/// Audit sink writing to `{dir}/{prefix}_{timestamp}.log`.
///
/// Each `session_started` record opens a new file, so one sink can serve
/// consecutive sessions.
pub struct FileAuditLog {
    dir: PathBuf,
    open: Mutex<Option<OpenLog>>,
}

struct OpenLog {
    file: File,
    path: PathBuf,
    started_at: DateTime<Utc>,
}

impl FileAuditLog {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            open: Mutex::new(None),
        }
    }

    /// Create a fresh log for a session starting at `started_at`. A name
    /// already taken by another session moves the file's timestamp forward a
    /// millisecond at a time.
    fn create(&self, started_at: DateTime<Utc>) -> Result<OpenLog> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;
        let mut options = OpenOptions::new();
        options.create_new(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut named_at = started_at;
        for _ in 0..MAX_NAME_COLLISIONS {
            let path = self.dir.join(log_file_name(None, named_at));
            match options.open(&path) {
                Ok(file) => {
                    return Ok(OpenLog {
                        file,
                        path,
                        started_at: named_at,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    named_at += TimeDelta::milliseconds(1);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("cannot create {}", path.display()));
                }
            }
        }
        bail!(
            "cannot create an audit log in {}: every name near {} is taken",
            self.dir.display(),
            started_at
        )
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut guard = self
            .open
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?;
        if let AuditRecord::SessionStarted { started_at, .. } = record {
            *guard = Some(self.create(*started_at)?);
        }
        let Some(log) = guard.as_mut() else {
            bail!("audit log must start with a session_started record");
        };

        let mut line = serde_json::to_string(record).context("cannot serialize audit record")?;
        line.push('\n');
        log.file
            .write_all(line.as_bytes())
            .with_context(|| format!("cannot write {}", log.path.display()))?;
        log.file
            .sync_data()
            .with_context(|| format!("cannot sync {}", log.path.display()))
    }

    fn bind_identity(&self, identity: &DeviceIdentity) -> Result<()> {
        let mut guard = self
            .open
            .lock()
            .map_err(|_| anyhow::anyhow!("audit log lock poisoned"))?;
        let Some(log) = guard.as_mut() else {
            bail!("audit log is not open");
        };
        let renamed = self.dir.join(log_file_name(Some(identity), log.started_at));
        if renamed == log.path {
            return Ok(());
        }
        if renamed.exists() {
            bail!("{} already exists", renamed.display());
        }
        std::fs::rename(&log.path, &renamed).with_context(|| {
            format!("cannot rename {} to {}", log.path.display(), renamed.display())
        })?;
        log.path = renamed;
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        self.open
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|log| log.path.clone()))
    }
}

/// Audit logs in `dir`, newest first. A missing directory has no logs.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_logs(dir: &Path) -> Result<Vec<LogEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("cannot read {}", dir.display()))?;
        let name = entry.file_name();
        let Some((device, started_at)) = name.to_str().and_then(parse_log_file_name) else {
            continue;
        };
        entries.push(LogEntry {
            path: entry.path(),
            device,
            started_at,
        });
    }
    entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(a.device.cmp(&b.device)));
    Ok(entries)
}

/// Parse every record of one audit log.
///
/// # Errors
///
/// Returns an error naming the line that does not parse.
pub fn read_log(path: &Path) -> Result<Vec<AuditRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid audit record", path.display(), n + 1))
        })
        .collect()
}

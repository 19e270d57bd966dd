//! Audit log file naming.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::domain::identity::DeviceIdentity;

/// Prefix used until the device identity is known.
pub const UNIDENTIFIED: &str = "UNIDENTIFIED";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";
/// Whole-second names written by earlier releases.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `{hardwareId}_{timestamp}.log`, or `UNIDENTIFIED_{timestamp}.log` before
/// the identity has been resolved. The timestamp is the session start, to
/// the millisecond.
#[must_use]
pub fn log_file_name(identity: Option<&DeviceIdentity>, started_at: DateTime<Utc>) -> String {
    let prefix = identity.map_or(UNIDENTIFIED, DeviceIdentity::as_str);
    format!("{prefix}_{}.log", started_at.format(TIMESTAMP_FORMAT))
}

/// Split an audit log file name into its prefix and session start time.
#[must_use]
pub fn parse_log_file_name(name: &str) -> Option<(String, DateTime<Utc>)> {
    let stem = name.strip_suffix(".log")?;
    let (prefix, ts) = stem.rsplit_once('_')?;
    if prefix.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(ts, LEGACY_TIMESTAMP_FORMAT))
        .ok()?;
    Some((prefix.to_string(), naive.and_utc()))
}

/// One audit log file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub path: PathBuf,
    /// Hardware id, or `UNIDENTIFIED`.
    pub device: String,
    pub started_at: DateTime<Utc>,
}

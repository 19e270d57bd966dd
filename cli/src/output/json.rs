//! JSON output helpers.
//!
//! Live session events are written one JSON object per line so a consumer
//! can follow a session as it runs. Every other command prints a single
//! pretty-printed object.

use anyhow::{Context, Result};
use outpost_common::{AuditRecord, SessionEvent};
use serde::Serialize;

use crate::application::SessionReport;
use crate::domain::DeviceIdentity;
use crate::domain::audit::LogEntry;

/// Renders domain types as JSON on stdout.
pub struct JsonRenderer;

#[derive(Serialize)]
struct ReportView<'a> {
    event: &'static str,
    session_id: String,
    #[serde(flatten)]
    status: &'a outpost_common::TerminalStatus,
    hardware_id: Option<&'a str>,
    audit_log: Option<String>,
    cancel_requested: bool,
    stages: &'a [outpost_common::StageResult],
}

#[derive(Serialize)]
struct LogView<'a> {
    path: String,
    device: &'a str,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_event(&self, event: &SessionEvent) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string(event).context("JSON serialization failed")?
        );
        Ok(())
    }

    /// Final line of the event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_report(&self, report: &SessionReport) -> Result<()> {
        println!("{}", report_json(report)?);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_logs(&self, logs: &[LogEntry]) -> Result<()> {
        let views: Vec<LogView<'_>> = logs
            .iter()
            .map(|l| LogView {
                path: l.path.display().to_string(),
                device: &l.device,
                started_at: l.started_at,
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&views).context("JSON serialization failed")?
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_log(&self, records: &[AuditRecord]) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(records).context("JSON serialization failed")?
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        let obj = serde_json::json!({ "version": version });
        println!(
            "{}",
            serde_json::to_string_pretty(&obj).context("JSON serialization failed")?
        );
        Ok(())
    }
}

/// Single-line JSON form of a session report.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn report_json(report: &SessionReport) -> Result<String> {
    let view = ReportView {
        event: "report",
        session_id: report.session_id.to_string(),
        status: &report.status,
        hardware_id: report.identity.as_ref().map(DeviceIdentity::as_str),
        audit_log: report.audit_path.as_ref().map(|p| p.display().to_string()),
        cancel_requested: report.cancel_requested,
        stages: &report.history,
    };
    serde_json::to_string(&view).context("JSON serialization failed")
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

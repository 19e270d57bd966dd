//! Human-readable terminal renderer.

use std::path::Path;

use outpost_common::{
    AuditRecord, SessionEvent, StageName, StageOutcome, StageResult, TerminalStatus,
};
use owo_colors::OwoColorize as _;

use crate::application::SessionReport;
use crate::domain::DeviceIdentity;
use crate::domain::audit::LogEntry;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if !self.ctx.quiet {
            println!("outpost {version}");
        }
    }

    /// One line per finished stage. Terminal events are left to `render_report`.
    pub fn render_event(&self, event: &SessionEvent) {
        let SessionEvent::Stage { stage, outcome, .. } = event else {
            return;
        };
        let line = format_stage_event(*stage, *outcome);
        match outcome {
            StageOutcome::Success => self.ctx.success(&line),
            StageOutcome::Skipped => self.ctx.info(&line),
            StageOutcome::Cancelled => self.ctx.warn(&line),
            StageOutcome::Failed => self.ctx.error(&line),
        }
    }

    /// Session summary printed once the pipeline has stopped.
    pub fn render_report(&self, report: &SessionReport) {
        if !self.ctx.quiet {
            println!();
        }
        self.ctx.kv("Session:  ", &report.session_id.to_string());
        self.ctx.kv(
            "Device:   ",
            report
                .identity
                .as_ref()
                .map_or("unidentified", DeviceIdentity::as_str),
        );
        if let Some(path) = &report.audit_path {
            self.ctx.kv("Audit log:", &path.display().to_string());
        }
        if let Some(failed) = report
            .history
            .iter()
            .find(|r| r.outcome == StageOutcome::Failed)
        {
            self.ctx.kv("Stage:    ", &format_attempts(failed));
        }
        if !self.ctx.quiet {
            println!();
        }
        match &report.status {
            TerminalStatus::Completed if report.cancel_requested => self
                .ctx
                .success("Provisioning completed before the cancellation took effect"),
            TerminalStatus::Completed => self.ctx.success("Provisioning completed"),
            TerminalStatus::Cancelled => self.ctx.warn("Provisioning cancelled"),
            TerminalStatus::Failed { .. } => {
                self.ctx
                    .error(&format!("Provisioning failed: {}", format_status(&report.status)));
            }
        }
    }

    /// Audit logs on disk, newest first.
    pub fn render_logs(&self, dir: &Path, logs: &[LogEntry]) {
        if logs.is_empty() {
            self.ctx
                .info(&format!("No audit logs in {}", dir.display()));
            return;
        }
        if self.ctx.quiet {
            return;
        }
        println!();
        println!(
            "  {}",
            format!("Audit logs ({})", dir.display()).style(self.ctx.styles.header)
        );
        println!();
        for log in logs {
            let name = log
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!(
                "  {}  {:<16} {}",
                log.started_at.format("%Y-%m-%d %H:%M:%S"),
                log.device,
                name.style(self.ctx.styles.dim)
            );
        }
        println!();
    }

    /// Every record of one audit log.
    pub fn render_log(&self, path: &Path, records: &[AuditRecord]) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header(&path.display().to_string());
        println!();
        for record in records {
            match record {
                AuditRecord::SessionStarted {
                    session_id,
                    target,
                    started_at,
                } => {
                    self.ctx.kv("Session:  ", &session_id.to_string());
                    self.ctx.kv("Target:   ", target);
                    self.ctx.kv("Started:  ", &started_at.to_rfc3339());
                }
                AuditRecord::Identity { hardware_id, .. } => {
                    self.ctx.kv("Device:   ", hardware_id);
                    println!();
                }
                AuditRecord::Stage { result, .. } => {
                    let line = format!("{}  {}", format_attempts(result), result.summary);
                    match result.outcome {
                        StageOutcome::Success => self.ctx.success(&line),
                        StageOutcome::Skipped => self.ctx.info(&line),
                        StageOutcome::Cancelled => self.ctx.warn(&line),
                        StageOutcome::Failed => self.ctx.error(&line),
                    }
                }
                AuditRecord::SessionFinished {
                    status,
                    finished_at,
                    ..
                } => {
                    println!();
                    self.ctx.kv("Finished: ", &finished_at.to_rfc3339());
                    let text = format_status(status);
                    self.ctx.kv(
                        "Status:   ",
                        &text.style(self.ctx.styles.status(status)).to_string(),
                    );
                }
            }
        }
        println!();
    }
}

// ── Display helpers ──────────────────────────────────────────────────────────

#[must_use]
pub fn outcome_display(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Success => "done",
        StageOutcome::Failed => "failed",
        StageOutcome::Skipped => "skipped",
        StageOutcome::Cancelled => "cancelled",
    }
}

#[must_use]
pub fn format_stage_event(stage: StageName, outcome: StageOutcome) -> String {
    match outcome {
        StageOutcome::Success => capitalize(stage.label()),
        other => format!("{} {}", capitalize(stage.label()), outcome_display(other)),
    }
}

/// `"deploying payload failed after 3 attempts"`.
#[must_use]
pub fn format_attempts(result: &StageResult) -> String {
    let noun = if result.attempts == 1 { "attempt" } else { "attempts" };
    match result.outcome {
        StageOutcome::Skipped => format!("{} skipped", result.stage.label()),
        outcome => format!(
            "{} {} after {} {noun}",
            result.stage.label(),
            outcome_display(outcome),
            result.attempts
        ),
    }
}

#[must_use]
pub fn format_status(status: &TerminalStatus) -> String {
    match status {
        TerminalStatus::Completed => "completed".to_string(),
        TerminalStatus::Cancelled => "cancelled".to_string(),
        TerminalStatus::Failed {
            kind,
            cause: Some(cause),
            message,
        } => format!("{kind} ({cause}): {message}"),
        TerminalStatus::Failed { kind, message, .. } => format!("{kind}: {message}"),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

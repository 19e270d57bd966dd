//! `outpost audit list|show` over logs written by the real audit sink.

#![allow(clippy::expect_used)]

use std::path::Path;

use chrono::{TimeZone, Utc};
use outpost_cli::application::AuditSink;
use outpost_cli::domain::DeviceIdentity;
use outpost_cli::infra::audit::FileAuditLog;
use outpost_common::{AuditRecord, StageName, StageOutcome, StageResult, TerminalStatus};
use predicates::prelude::*;
use tempfile::TempDir;
use uuid::Uuid;

use crate::helpers::outpost;

/// Write one completed session for `hardware_id` starting at `hour`.
fn seed_session(dir: &Path, hardware_id: &str, hour: u32) {
    let sink = FileAuditLog::new(dir.to_path_buf());
    let session_id = Uuid::new_v4();
    let started_at = Utc
        .with_ymd_and_hms(2026, 3, 1, hour, 0, 0)
        .single()
        .expect("valid time");
    sink.append(&AuditRecord::SessionStarted {
        session_id,
        target: "root@192.168.1.1:22".into(),
        started_at,
    })
    .expect("append start");
    let identity = DeviceIdentity::normalize(hardware_id).expect("valid id");
    sink.bind_identity(&identity).expect("bind");
    sink.append(&AuditRecord::Identity {
        session_id,
        hardware_id: identity.to_string(),
        resolved_at: started_at,
    })
    .expect("append identity");
    sink.append(&AuditRecord::Stage {
        session_id,
        result: StageResult {
            stage: StageName::Deploying,
            outcome: StageOutcome::Success,
            attempts: 2,
            started_at,
            ended_at: started_at,
            error_kind: None,
            error_cause: None,
            summary: "uploaded and installed".into(),
        },
    })
    .expect("append stage");
    sink.append(&AuditRecord::SessionFinished {
        session_id,
        status: TerminalStatus::Completed,
        finished_at: started_at,
    })
    .expect("append finish");
}

fn seeded() -> TempDir {
    let home = TempDir::new().expect("tempdir");
    let dir = home.path().join("audit");
    seed_session(&dir, "aa:bb:cc:dd:ee:ff", 8);
    seed_session(&dir, "aa:bb:cc:dd:ee:ff", 9);
    seed_session(&dir, "11-22-33-44-55-66", 10);
    home
}

#[test]
fn list_shows_newest_first() {
    let home = seeded();
    let dir = home.path().join("audit");

    let stdout = outpost(home.path())
        .args(["audit", "list", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(stdout).expect("utf-8");

    let first = stdout.find("112233445566").expect("newest listed");
    let second = stdout.find("AABBCCDDEEFF").expect("older listed");
    assert!(first < second, "{stdout}");
    assert!(stdout.contains("2026-03-01 10:00:00"), "{stdout}");
}

#[test]
fn list_json_is_an_array_of_entries() {
    let home = seeded();
    let dir = home.path().join("audit");

    let stdout = outpost(home.path())
        .args(["--json", "audit", "list", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&stdout).expect("JSON array");
    let entries = value.as_array().expect("array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["device"], "112233445566");
    assert!(
        entries[0]["path"]
            .as_str()
            .expect("path")
            .ends_with("112233445566_20260301T100000.000Z.log")
    );
}

#[test]
fn list_of_an_empty_directory_says_so() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .args(["audit", "list", "--dir"])
        .arg(home.path().join("nothing-here"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No audit logs in"));
}

#[test]
fn list_uses_audit_dir_from_the_configuration() {
    let home = seeded();
    let config = home.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "target: {{address: 192.168.1.1, credential: {{key_file: /k}}}}\n\
             authorized_devices: ['aa:bb:cc:dd:ee:ff']\n\
             audit: {{dir: {}}}\n",
            home.path().join("audit").display()
        ),
    )
    .expect("write config");

    outpost(home.path())
        .args(["audit", "list", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("AABBCCDDEEFF"));
}

#[test]
fn show_by_hardware_id_picks_the_newest_session() {
    let home = seeded();
    let dir = home.path().join("audit");

    outpost(home.path())
        .args(["audit", "show", "aa:bb:cc:dd:ee:ff", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("AABBCCDDEEFF_20260301T090000.000Z.log"))
        .stdout(predicate::str::contains(
            "deploying payload done after 2 attempts  uploaded and installed",
        ))
        .stdout(predicate::str::contains("completed"));
}

#[test]
fn show_json_returns_the_records() {
    let home = seeded();
    let dir = home.path().join("audit");

    let stdout = outpost(home.path())
        .args(["--json", "audit", "show", "AABBCCDDEEFF_20260301T080000.000Z.log", "--dir"])
        .arg(&dir)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let records: Vec<AuditRecord> = serde_json::from_slice(&stdout).expect("records");
    assert_eq!(records.len(), 4);
    assert!(matches!(records[0], AuditRecord::SessionStarted { .. }));
    assert!(matches!(
        records[3],
        AuditRecord::SessionFinished {
            status: TerminalStatus::Completed,
            ..
        }
    ));
}

#[test]
fn show_unknown_log_fails() {
    let home = seeded();
    outpost(home.path())
        .args(["audit", "show", "00:00:00:00:00:01", "--dir"])
        .arg(home.path().join("audit"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no audit log matching"));
}

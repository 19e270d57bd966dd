//! Integration tests for the CLI skeleton: help, version and global flags.

#![allow(clippy::expect_used)]

use predicates::prelude::*;
use tempfile::TempDir;

use crate::helpers::outpost;

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let home = TempDir::new().expect("tempdir");
    // clap with arg_required_else_help shows help on stderr and exits 2
    outpost(home.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Provision network appliances over SSH",
        ));
}

#[test]
fn test_cli_help_lists_commands() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn test_version_command_shows_version() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("outpost 0.1.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let home = TempDir::new().expect("tempdir");
    let output = outpost(home.path())
        .args(["--json", "version"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value =
        serde_json::from_slice(&output).expect("version output is JSON");
    assert_eq!(value["version"], "0.1.0");
}

#[test]
fn test_cli_version_flag_shows_version() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("outpost"));
}

// --- Global flags tests ---

#[test]
fn test_global_quiet_flag_accepted() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .args(["--quiet", "version"])
        .assert()
        .success();
}

#[test]
fn test_global_flags_accepted_after_subcommand() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .args(["version", "--no-color", "-y"])
        .assert()
        .success();
}

// --- Error handling tests ---

#[test]
fn test_unknown_command_exits_with_error() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path())
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_audit_requires_a_subcommand() {
    let home = TempDir::new().expect("tempdir");
    outpost(home.path()).arg("audit").assert().code(2);
}

// --- Environment flags ---

#[test]
fn test_no_color_env_accepts_conventional_values() {
    let home = TempDir::new().expect("tempdir");
    for value in ["1", "true", "yes", "0", ""] {
        outpost(home.path())
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("outpost 0.1.0"));
    }
}

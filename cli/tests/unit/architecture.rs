//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries hold:
//! `domain` is pure, `application` talks to the outside world only through
//! its ports, and commands never render output themselves.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn src_dir(layer: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer)
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-test, non-comment lines of every file in `dir`, with their line numbers.
fn production_lines(dir: &Path) -> Vec<(String, usize, String)> {
    let mut out = Vec::new();
    for file in collect_rs_files(dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = relative(&file);
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") || trimmed.is_empty() {
                continue;
            }
            out.push((rel.clone(), i + 1, line.to_string()));
        }
    }
    out
}

/// Lines in `dir` containing any of `patterns`, formatted for an assertion message.
fn find(dir: &Path, patterns: &[&str]) -> Vec<String> {
    production_lines(dir)
        .into_iter()
        .filter(|(_, _, line)| patterns.iter().any(|p| line.contains(p)))
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect()
}

// ── Domain purity ─────────────────────────────────────────────────────────────

#[test]
fn domain_has_no_io_or_outer_layer_imports() {
    let violations = find(
        &src_dir("domain"),
        &[
            "tokio",
            "std::fs",
            "std::process",
            "std::net",
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay free of I/O and outer layers:\n{}",
        violations.join("\n")
    );
}

// ── Application layer boundary ───────────────────────────────────────────────

#[test]
fn application_has_no_infra_or_output_imports() {
    let violations = find(
        &src_dir("application"),
        &["crate::infra", "crate::output", "crate::commands"],
    );
    assert!(
        violations.is_empty(),
        "application/ must not import from infra/, output/ or commands/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_reaches_devices_only_through_ports() {
    let violations = find(
        &src_dir("application"),
        &["std::fs::", "std::process::Command", "tokio::process", "std::net::"],
    );
    assert!(
        violations.is_empty(),
        "application/ must use RemoteTransport/RemoteShell/AuditSink instead of direct I/O:\n{}",
        violations.join("\n")
    );
}

// ── Infrastructure ────────────────────────────────────────────────────────────

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let violations = find(&src_dir("infra"), &["crate::commands", "crate::output"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let violations = find(&src_dir("infra"), &["println!", "eprintln!"]);
    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        violations.join("\n")
    );
}

#[test]
fn only_infra_spawns_processes() {
    let violations: Vec<String> = find(&src_dir(""), &["Command::new("])
        .into_iter()
        .filter(|v| !v.replace('\\', "/").starts_with("src/infra/"))
        .collect();
    assert!(
        violations.is_empty(),
        "processes must be spawned from infra/ (see TokioCommandRunner):\n{}",
        violations.join("\n")
    );
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let mut violations = find(&src_dir("commands"), &["json: bool", "is_json()"]);
    violations.extend(
        production_lines(&src_dir("commands"))
            .into_iter()
            .filter(|(_, _, line)| {
                let t = line.trim();
                t.starts_with("if json") || t.starts_with("if !json")
            })
            .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim())),
    );
    assert!(
        violations.is_empty(),
        "Found inline JSON branching in commands/ — use app.renderer() instead:\n{}",
        violations.join("\n")
    );
}

#[test]
fn commands_do_not_print_directly() {
    let violations = find(&src_dir("commands"), &["println!", "print!("]);
    assert!(
        violations.is_empty(),
        "commands/ must print through app.output or app.renderer():\n{}",
        violations.join("\n")
    );
}

/// All confirmation prompts in `commands/` must go through `app.confirm()`.
#[test]
fn commands_use_standardized_confirmation() {
    let violations = find(
        &src_dir("commands"),
        &["io::stdin().lock()", "Confirm::new()"],
    );
    assert!(
        violations.is_empty(),
        "Commands must use app.confirm() for user prompts:\n{}",
        violations.join("\n")
    );
}

/// Each file in `commands/` stays a thin adapter over application services.
#[test]
fn command_handlers_are_reasonably_sized() {
    let mut counts = std::collections::BTreeMap::<String, usize>::new();
    for (rel, _, _) in production_lines(&src_dir("commands")) {
        *counts.entry(rel).or_default() += 1;
    }
    let violations: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 150)
        .map(|(rel, n)| format!("{rel}: {n} non-test lines (limit: 150)"))
        .collect();
    assert!(
        violations.is_empty(),
        "Command handler files exceed 150-line limit — extract logic to application services:\n{}",
        violations.join("\n")
    );
}

/// No module-level `#![allow(dead_code)]` in domain/, application/, or infra/.
#[test]
fn no_module_level_dead_code_allows_in_layers() {
    let violations: Vec<String> = ["domain", "application", "infra"]
        .iter()
        .flat_map(|layer| find(&src_dir(layer), &["#![allow(dead_code)]"]))
        .collect();
    assert!(
        violations.is_empty(),
        "Module-level #![allow(dead_code)] found in architecture layers:\n{}",
        violations.join("\n")
    );
}

//! POSIX shell quoting for commands sent to the device.

/// Quote `s` as a single shell word.
///
/// Wraps in single quotes and rewrites embedded `'` as `'\''`.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Run `command` in the background, detached from the session's stdio, so
/// the remote call returns immediately even if the command drops the link.
#[must_use]
pub fn detached(command: &str) -> String {
    format!("nohup sh -c {} </dev/null >/dev/null 2>&1 &", shell_quote(command))
}

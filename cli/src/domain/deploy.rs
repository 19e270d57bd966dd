//! Payload deployment: digest, remote command builders and status parsing.

use sha2::{Digest, Sha256};

use crate::domain::shell::{detached, shell_quote};

/// Infrastructure payload pushed to the device.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    sha256: String,
}

impl Payload {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let sha256 = hex_encode(&Sha256::digest(&bytes));
        Self { bytes, sha256 }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lower-case hex SHA-256 of the payload.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.bytes.len())
            .field("sha256", &self.sha256)
            .finish()
    }
}

/// Contents of the remote status file written around the install command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStatus {
    /// No status file: the install has never been triggered.
    Absent,
    Running,
    Succeeded,
    /// The install command exited with this non-zero code.
    Failed(i32),
    Unknown(String),
}

impl DeployStatus {
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let s = contents.trim();
        if s.is_empty() {
            return DeployStatus::Absent;
        }
        if s == "running" {
            return DeployStatus::Running;
        }
        match s.parse::<i32>() {
            Ok(0) => DeployStatus::Succeeded,
            Ok(code) => DeployStatus::Failed(code),
            Err(_) => DeployStatus::Unknown(s.to_string()),
        }
    }
}

/// Print the status file, or nothing when it does not exist.
#[must_use]
pub fn status_command(status_file: &str) -> String {
    format!("cat {} 2>/dev/null || true", shell_quote(status_file))
}

/// Mark the install as running, then run it detached. The install's exit
/// code replaces `running` in the status file when it finishes, through a
/// rename so a concurrent read never sees the file empty.
#[must_use]
pub fn trigger_command(install_command: &str, status_file: &str) -> String {
    let file = shell_quote(status_file);
    let tmp = shell_quote(&format!("{status_file}.tmp"));
    let job = format!("({install_command}); echo $? > {tmp} && mv {tmp} {file}");
    format!("echo running > {file} && {}", detached(&job))
}

/// Print the remote file's SHA-256, or nothing when it does not exist.
#[must_use]
pub fn checksum_command(remote_path: &str) -> String {
    format!("sha256sum {} 2>/dev/null || true", shell_quote(remote_path))
}

/// Extract the digest from `sha256sum` output.
#[must_use]
pub fn parse_checksum(stdout: &str) -> Option<String> {
    let digest = stdout.split_whitespace().next()?;
    (digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_ascii_lowercase())
}

/// Write stdin to `remote_path` through a temporary file so a broken upload
/// never leaves a truncated payload under the final name.
#[must_use]
pub fn upload_command(remote_path: &str) -> String {
    let part = shell_quote(&format!("{remote_path}.part"));
    format!("cat > {part} && mv {part} {}", shell_quote(remote_path))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

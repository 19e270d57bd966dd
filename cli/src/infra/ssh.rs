//! OpenSSH transport.
//!
//! One authenticated master connection per session, held open through a
//! private control socket (`ControlMaster`/`ControlPersist`). Every command
//! and upload is multiplexed over that socket, so authentication happens
//! exactly once. Password credentials are handed to `sshpass -e` through the
//! environment, never on a command line.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::application::ports::{CommandRunner, CommandTimedOut, RemoteShell, RemoteTransport};
use crate::domain::deploy::upload_command;
use crate::domain::{Credential, ProvisionError, Target};

/// Slack on top of `ConnectTimeout` for key exchange and authentication.
const AUTH_SLACK: Duration = Duration::from_secs(20);

/// Timeout for `ssh -O exit`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// sshpass: the password was rejected.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: the host key is unknown and could not be accepted.
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

/// Known-hosts file dedicated to outpost (`~/.outpost/known_hosts`).
///
/// New devices are accepted on first contact; a device that later answers
/// with a different key for a known address fails authentication.
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    /// Creates a handle pointing at `~/.outpost/known_hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_path(home.join(".outpost").join("known_hosts")))
    }

    /// Creates a handle pointing at an arbitrary path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file (600) and its parent directory (700) if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or directory cannot be created.
    pub fn ensure(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
            set_permissions(parent, 0o700)?;
        }
        if !self.path.exists() {
            std::fs::write(&self.path, b"")
                .with_context(|| format!("create {}", self.path.display()))?;
        }
        set_permissions(&self.path, 0o600)
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// `RemoteTransport` backed by the system `ssh` client.
pub struct SshTransport<R> {
    runner: Arc<R>,
    known_hosts: PathBuf,
    connect_timeout: Duration,
}

impl<R: CommandRunner> SshTransport<R> {
    #[must_use]
    pub fn new(runner: R, known_hosts: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            runner: Arc::new(runner),
            known_hosts,
            connect_timeout,
        }
    }
}

impl<R: CommandRunner> RemoteTransport for SshTransport<R> {
    type Connection = SshConnection<R>;

    async fn probe(&self, target: &Target, timeout: Duration) -> Result<(), ProvisionError> {
        let addr = (target.address.as_str(), target.port);
        match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProvisionError::Unreachable {
                address: target.address.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ProvisionError::Unreachable {
                address: target.address.clone(),
                reason: format!("no answer on port {} within {}s", target.port, timeout.as_secs()),
            }),
        }
    }

    async fn connect(&self, target: &Target) -> Result<Self::Connection, ProvisionError> {
        let socket_dir = tempfile::Builder::new()
            .prefix("outpost-")
            .tempdir()
            .map_err(|e| ProvisionError::ChannelClosed(format!("control socket dir: {e}")))?;
        let socket = socket_dir.path().join("ctl");

        let args = master_args(target, &socket, &self.known_hosts, self.connect_timeout);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let timeout = self.connect_timeout + AUTH_SLACK;
        debug!(target = %target.display_name(), "opening ssh master");

        let (result, via_sshpass) = match &target.credential {
            Credential::KeyFile(_) => (
                self.runner.run_with_timeout("ssh", &arg_refs, timeout).await,
                false,
            ),
            Credential::Password(password) => {
                let mut with_ssh = vec!["-e", "ssh"];
                with_ssh.extend(arg_refs.iter().copied());
                (
                    self.runner
                        .run_with_env("sshpass", &with_ssh, &[("SSHPASS", password.as_str())], timeout)
                        .await,
                    true,
                )
            }
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if e.downcast_ref::<CommandTimedOut>().is_some() => {
                return Err(ProvisionError::Unreachable {
                    address: target.address.clone(),
                    reason: format!("ssh did not complete within {}s", timeout.as_secs()),
                });
            }
            Err(e) => return Err(ProvisionError::ChannelClosed(format!("{e:#}"))),
        };
        if !output.status.success() {
            return Err(classify_connect_failure(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
                via_sshpass,
                &target.address,
            ));
        }
        info!(target = %target.display_name(), "ssh master established");

        Ok(SshConnection {
            runner: Arc::clone(&self.runner),
            socket,
            destination: target.destination(),
            port: target.port,
            closed: false,
            _socket_dir: socket_dir,
        })
    }
}

/// An authenticated master connection. Commands run over its control socket.
pub struct SshConnection<R> {
    runner: Arc<R>,
    socket: PathBuf,
    destination: String,
    port: u16,
    closed: bool,
    // Removed (with the socket) after `Drop` has stopped the master.
    _socket_dir: TempDir,
}

impl<R: CommandRunner> SshConnection<R> {
    fn client_args(&self, command: &str) -> Vec<String> {
        client_args(&self.socket, self.port, &self.destination, command)
    }

    fn map_run_error(command: &str, timeout: Duration, e: &anyhow::Error) -> ProvisionError {
        if e.downcast_ref::<CommandTimedOut>().is_some() {
            ProvisionError::CommandTimeout {
                command: command.to_string(),
                timeout,
            }
        } else {
            ProvisionError::ChannelClosed(format!("{e:#}"))
        }
    }

    fn ensure_open(&self) -> Result<(), ProvisionError> {
        if self.closed {
            return Err(ProvisionError::ChannelClosed("connection already closed".into()));
        }
        Ok(())
    }
}

impl<R: CommandRunner> RemoteShell for SshConnection<R> {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<Output, ProvisionError> {
        self.ensure_open()?;
        let args = self.client_args(command);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(command, "remote exec");
        let output = self
            .runner
            .run_with_timeout("ssh", &arg_refs, timeout)
            .await
            .map_err(|e| Self::map_run_error(command, timeout, &e))?;
        client_outcome(output)
    }

    async fn upload(
        &self,
        bytes: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ProvisionError> {
        self.ensure_open()?;
        let command = upload_command(remote_path);
        let args = self.client_args(&command);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(remote_path, bytes = bytes.len(), "remote upload");
        let output = self
            .runner
            .run_with_stdin("ssh", &arg_refs, bytes, timeout)
            .await
            .map_err(|e| Self::map_run_error(&command, timeout, &e))?;
        let output = client_outcome(output)?;
        if output.status.success() {
            return Ok(());
        }
        Err(ProvisionError::ChannelClosed(format!(
            "upload to {remote_path} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    async fn close(&mut self) -> Result<(), ProvisionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let args = exit_args(&self.socket, &self.destination);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout("ssh", &arg_refs, CLOSE_TIMEOUT)
            .await
            .map_err(|e| Self::map_run_error("ssh -O exit", CLOSE_TIMEOUT, &e))?;
        if !output.status.success() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ssh master did not acknowledge exit"
            );
        }
        debug!("ssh master closed");
        Ok(())
    }
}

impl<R> Drop for SshConnection<R> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Backstop for paths that never reached `close()`.
        let args = exit_args(&self.socket, &self.destination);
        let _ = std::process::Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Separates a broken channel from a remote command's own exit status.
///
/// The ssh client exits 255 when the connection fails, and has no exit code
/// at all when a signal killed it. Either way the remote command's outcome is
/// unknown.
fn client_outcome(output: Output) -> Result<Output, ProvisionError> {
    match output.status.code() {
        None => Err(ProvisionError::ChannelClosed(
            "ssh client terminated by a signal".into(),
        )),
        Some(255) => Err(ProvisionError::ChannelClosed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Some(_) => Ok(output),
    }
}

/// Arguments that open the master connection and run `exit 0` through it.
#[must_use]
pub fn master_args(
    target: &Target,
    socket: &Path,
    known_hosts: &Path,
    connect_timeout: Duration,
) -> Vec<String> {
    let mut args = vec![
        "-M".to_string(),
        "-S".to_string(),
        socket.display().to_string(),
        "-o".to_string(),
        "ControlPersist=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!("UserKnownHostsFile={}", known_hosts.display()),
        "-o".to_string(),
        "ServerAliveInterval=15".to_string(),
        "-o".to_string(),
        "ServerAliveCountMax=3".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-p".to_string(),
        target.port.to_string(),
    ];
    match &target.credential {
        Credential::KeyFile(key) => {
            args.extend([
                "-i".to_string(),
                key.display().to_string(),
                "-o".to_string(),
                "IdentitiesOnly=yes".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
            ]);
        }
        Credential::Password(_) => {
            args.extend([
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
                "-o".to_string(),
                "PubkeyAuthentication=no".to_string(),
                "-o".to_string(),
                "NumberOfPasswordPrompts=1".to_string(),
            ]);
        }
    }
    args.extend([
        "--".to_string(),
        target.destination(),
        "exit 0".to_string(),
    ]);
    args
}

/// Arguments that run `command` over an existing master.
#[must_use]
pub fn client_args(socket: &Path, port: u16, destination: &str, command: &str) -> Vec<String> {
    vec![
        "-S".to_string(),
        socket.display().to_string(),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-p".to_string(),
        port.to_string(),
        "--".to_string(),
        destination.to_string(),
        command.to_string(),
    ]
}

fn exit_args(socket: &Path, destination: &str) -> Vec<String> {
    vec![
        "-S".to_string(),
        socket.display().to_string(),
        "-O".to_string(),
        "exit".to_string(),
        destination.to_string(),
    ]
}

/// ssh stderr fragments that mean the server answered but refused us.
const AUTH_MARKERS: [&str; 5] = [
    "Permission denied",
    "Host key verification failed",
    "REMOTE HOST IDENTIFICATION HAS CHANGED",
    "Too many authentication failures",
    "Authentication failed",
];

/// Map a failed master connection onto `AuthFailed` or `Unreachable`.
#[must_use]
pub fn classify_connect_failure(
    code: Option<i32>,
    stderr: &str,
    via_sshpass: bool,
    address: &str,
) -> ProvisionError {
    let reason = stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("ssh exited without a message")
        .to_string();

    if via_sshpass && matches!(code, Some(SSHPASS_BAD_PASSWORD | SSHPASS_HOST_KEY_UNKNOWN)) {
        let reason = if code == Some(SSHPASS_BAD_PASSWORD) {
            "password rejected".to_string()
        } else {
            "host key not accepted".to_string()
        };
        return ProvisionError::AuthFailed {
            address: address.to_string(),
            reason,
        };
    }

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        return ProvisionError::AuthFailed {
            address: address.to_string(),
            reason,
        };
    }
    ProvisionError::Unreachable {
        address: address.to_string(),
        reason,
    }
}

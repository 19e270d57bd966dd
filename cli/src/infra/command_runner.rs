//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::application::ports::{CommandRunner, CommandTimedOut};

/// Default timeout for local helper commands.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner`.
///
/// `tokio::time::timeout` around `.output().await` only drops the future and
/// can leave the OS process running. This implementation uses
/// `tokio::select!` with an explicit `child.kill()` so the process is always
/// terminated.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let child = spawn(Command::new(program).args(args).stdin(Stdio::null()), program)?;
        collect(child, program, None, timeout).await
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output> {
        let child = spawn(Command::new(program).args(args).stdin(Stdio::piped()), program)?;
        collect(child, program, Some(input.to_vec()), timeout).await
    }

    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let child = spawn(&mut cmd, program)?;
        collect(child, program, None, timeout).await
    }
}

/// Children get their own process group so a terminal Ctrl-C reaches only
/// outpost, never a command that is already in flight.
fn spawn(cmd: &mut Command, program: &str) -> Result<Child> {
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))
}

/// Feed `input` to stdin (if any), drain stdout/stderr and wait, killing the
/// child when `timeout` fires first.
async fn collect(
    mut child: Child,
    program: &str,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<Output> {
    let stdin_handle = child.stdin.take();
    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr, ()) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    if let (Some(mut stdin), Some(input)) = (stdin_handle, input) {
                        let _ = stdin.write_all(&input).await;
                        // Dropping stdin sends EOF.
                    }
                },
            );
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            Err(CommandTimedOut {
                program: program.to_string(),
                timeout,
            }
            .into())
        }
    }
}

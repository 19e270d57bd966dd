//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `outpost_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use outpost_common::{AuditRecord, ProvisionConfig};
use thiserror::Error;

use crate::domain::{DeviceIdentity, ProvisionError, Target};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// A local process exceeded its timeout and was killed.
///
/// Returned inside the `anyhow::Error` of [`CommandRunner`] methods so
/// callers can tell a timeout apart from a spawn failure with `downcast_ref`.
#[derive(Debug, Error)]
#[error("{program} timed out after {}s", timeout.as_secs())]
pub struct CommandTimedOut {
    pub program: String,
    pub timeout: Duration,
}

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned) and
    /// the error must wrap [`CommandTimedOut`].
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `input`.
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with extra environment variables. Used to hand secrets
    /// to a child without putting them on its command line.
    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Output>;
}

// ── Remote Transport Ports ────────────────────────────────────────────────────

/// Opens the authenticated command channel to a device.
#[allow(async_fn_in_trait)]
pub trait RemoteTransport {
    type Connection: RemoteShell;

    /// Check that `address:port` accepts TCP connections within `timeout`.
    ///
    /// # Errors
    ///
    /// `Unreachable` when nothing answers in time.
    async fn probe(&self, target: &Target, timeout: Duration) -> Result<(), ProvisionError>;

    /// Open and authenticate the session's single channel.
    ///
    /// # Errors
    ///
    /// `Unreachable` when there is no network path, `AuthFailed` when the
    /// channel opens but the credential or host key is rejected.
    async fn connect(&self, target: &Target) -> Result<Self::Connection, ProvisionError>;
}

/// An open channel to the device.
///
/// One command is in flight at a time. Nothing here retries: retry belongs to
/// the stage that issued the command.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run `command` through the remote shell and capture its output.
    ///
    /// # Errors
    ///
    /// `CommandTimeout` when `timeout` elapses, `ChannelClosed` when the
    /// channel is gone (including after [`RemoteShell::close`]).
    async fn execute(&self, command: &str, timeout: Duration) -> Result<Output, ProvisionError>;

    /// Stream `bytes` into `remote_path` over the same channel.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteShell::execute`], plus `ChannelClosed` when the remote
    /// side refuses the write.
    async fn upload(
        &self,
        bytes: &[u8],
        remote_path: &str,
        timeout: Duration,
    ) -> Result<(), ProvisionError>;

    /// Tear the channel down. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown command could not run; the channel
    /// is still considered closed.
    async fn close(&mut self) -> Result<(), ProvisionError>;
}

// ── Audit Port ────────────────────────────────────────────────────────────────

/// Append-only, durable, per-session audit log.
///
/// Sync trait: each append is a small write plus a flush to stable storage.
pub trait AuditSink {
    /// Append one record. The record must be durable when this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written. Callers fail the
    /// session rather than continue unaudited.
    fn append(&self, record: &AuditRecord) -> Result<()>;

    /// Re-key the log under the resolved device identity.
    fn bind_identity(&self, identity: &DeviceIdentity) -> Result<()>;

    /// Where the log currently lives, if it has been created.
    fn location(&self) -> Option<PathBuf>;
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Abstracts loading the provisioning configuration.
pub trait ConfigStore {
    /// Load and validate the configuration.
    fn load(&self) -> Result<ProvisionConfig>;
    /// Path of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}

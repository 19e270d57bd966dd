//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use outpost_common::{ErrorKind, StageName};
use thiserror::Error;

use crate::domain::session::SessionPhase;

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Every way a provisioning stage can fail.
///
/// `kind()` maps each variant onto the serializable [`ErrorKind`] that lands
/// in stage results, events and audit records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("{address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("authentication to {address} failed: {reason}")]
    AuthFailed { address: String, reason: String },

    #[error("command `{command}` timed out after {}s", timeout.as_secs())]
    CommandTimeout { command: String, timeout: Duration },

    #[error("remote channel closed: {0}")]
    ChannelClosed(String),

    #[error("device identity unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("device {hardware_id} is not in the authorization list")]
    Unauthorized { hardware_id: String },

    #[error("network configuration did not apply: {0}")]
    ConfigurationVerificationFailed(String),

    #[error("device has no internet connectivity: {0}")]
    ConnectivityTimeout(String),

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProvisionError>,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("audit log unavailable: {0}")]
    AuditUnavailable(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl ProvisionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::AuthFailed { .. } => ErrorKind::AuthFailed,
            Self::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            Self::ChannelClosed(_) => ErrorKind::ChannelClosed,
            Self::IdentityUnavailable(_) => ErrorKind::IdentityUnavailable,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::ConfigurationVerificationFailed(_) => {
                ErrorKind::ConfigurationVerificationFailed
            }
            Self::ConnectivityTimeout(_) => ErrorKind::ConnectivityTimeout,
            Self::DeploymentFailed(_) => ErrorKind::DeploymentFailed,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AuditUnavailable(_) => ErrorKind::AuditUnavailable,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
        }
    }

    /// Kind of the last underlying error for `RetriesExhausted`.
    #[must_use]
    pub fn cause_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last.kind()),
            _ => None,
        }
    }

    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

// ── Session errors ────────────────────────────────────────────────────────────

/// A stage sequencing rule was broken. Always a programming error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot start {requested} while in {phase}")]
    OutOfOrder {
        phase: SessionPhase,
        requested: StageName,
    },

    #[error("no stage in progress for a {0} result")]
    NoStageInProgress(StageName),

    #[error("result for {got} does not match in-progress stage {expected}")]
    ResultMismatch { expected: StageName, got: StageName },

    #[error("stage {0} has no recorded result")]
    StageUnrecorded(StageName),

    #[error("session already finished ({0})")]
    AlreadyFinished(SessionPhase),

    #[error("cannot complete from {0}")]
    IncompletePipeline(SessionPhase),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors found while validating a provisioning configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target.address must not be empty")]
    MissingAddress,

    #[error("authorized_devices must list at least one hardware id")]
    NoAuthorizedDevices,

    #[error("invalid hardware id in authorized_devices: {0:?}")]
    InvalidDeviceId(String),

    #[error("retry max_attempts for {0} must be at least 1")]
    ZeroAttempts(String),

    #[error("target.credential must set exactly one of key_file or password_env")]
    AmbiguousCredential,

    #[error("network.wan.proto is static but {0} is missing")]
    IncompleteStaticWan(&'static str),

    #[error("deploy.install_command must not be empty")]
    MissingInstallCommand,
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One named step of the provisioning pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Connecting,
    Authenticating,
    ResolvingIdentity,
    Authorizing,
    ConfiguringNetwork,
    VerifyingConnectivity,
    Deploying,
}

impl StageName {
    /// All stages in pipeline order.
    pub const ALL: [StageName; 7] = [
        StageName::Connecting,
        StageName::Authenticating,
        StageName::ResolvingIdentity,
        StageName::Authorizing,
        StageName::ConfiguringNetwork,
        StageName::VerifyingConnectivity,
        StageName::Deploying,
    ];

    /// The stage that follows this one, or `None` after `Deploying`.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Stages that change device state. These must never run before the
    /// device identity has been authorized.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        matches!(self, StageName::ConfiguringNetwork | StageName::Deploying)
    }

    /// Stable snake_case identifier, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Connecting => "connecting",
            StageName::Authenticating => "authenticating",
            StageName::ResolvingIdentity => "resolving_identity",
            StageName::Authorizing => "authorizing",
            StageName::ConfiguringNetwork => "configuring_network",
            StageName::VerifyingConnectivity => "verifying_connectivity",
            StageName::Deploying => "deploying",
        }
    }

    /// Human label used by terminal output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            StageName::Connecting => "connecting",
            StageName::Authenticating => "authenticating",
            StageName::ResolvingIdentity => "resolving device identity",
            StageName::Authorizing => "authorizing device",
            StageName::ConfiguringNetwork => "configuring network",
            StageName::VerifyingConnectivity => "verifying connectivity",
            StageName::Deploying => "deploying payload",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Failed,
    Skipped,
    Cancelled,
}

impl StageOutcome {
    /// Whether the session may advance past a stage with this outcome.
    #[must_use]
    pub fn advances(self) -> bool {
        matches!(self, StageOutcome::Success | StageOutcome::Skipped)
    }
}

/// Serializable error taxonomy shared by stage results, events and audit records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unreachable,
    AuthFailed,
    CommandTimeout,
    ChannelClosed,
    IdentityUnavailable,
    Unauthorized,
    ConfigurationVerificationFailed,
    ConnectivityTimeout,
    DeploymentFailed,
    RetriesExhausted,
    Cancelled,
    AuditUnavailable,
    InvalidTransition,
}

impl ErrorKind {
    /// Kinds expected to sometimes self-resolve on retry.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::CommandTimeout | ErrorKind::Unreachable | ErrorKind::ConnectivityTimeout
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::CommandTimeout => "command_timeout",
            ErrorKind::ChannelClosed => "channel_closed",
            ErrorKind::IdentityUnavailable => "identity_unavailable",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::ConfigurationVerificationFailed => "configuration_verification_failed",
            ErrorKind::ConnectivityTimeout => "connectivity_timeout",
            ErrorKind::DeploymentFailed => "deployment_failed",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::AuditUnavailable => "audit_unavailable",
            ErrorKind::InvalidTransition => "invalid_transition",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once record of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageResult {
    pub stage: StageName,
    pub outcome: StageOutcome,
    /// Number of attempts made, including the first.
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Inner kind when `error_kind` is `retries_exhausted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_cause: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

/// How a session ended. Exactly one per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    Completed,
    Failed {
        kind: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<ErrorKind>,
        message: String,
    },
    Cancelled,
}

impl TerminalStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Completed)
    }

    /// Error kind for `Failed`, `cancelled` for `Cancelled`.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TerminalStatus::Completed => None,
            TerminalStatus::Failed { kind, .. } => Some(*kind),
            TerminalStatus::Cancelled => Some(ErrorKind::Cancelled),
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Completed => f.write_str("completed"),
            TerminalStatus::Failed { kind, .. } => write!(f, "failed ({kind})"),
            TerminalStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Event published on the observation channel. A session publishes any
/// number of `Stage` events followed by exactly one `Finished`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Stage {
        stage: StageName,
        outcome: StageOutcome,
        timestamp: DateTime<Utc>,
    },
    Finished {
        status: TerminalStatus,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Finished { .. })
    }
}

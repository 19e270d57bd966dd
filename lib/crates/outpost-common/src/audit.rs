use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{StageResult, TerminalStatus};

/// One line of a session audit log (JSON lines).
///
/// A well-formed log holds one `SessionStarted`, at most one `Identity`,
/// one `Stage` per executed stage and exactly one closing `SessionFinished`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    SessionStarted {
        session_id: Uuid,
        /// `user@address:port` of the target. Credentials are never recorded.
        target: String,
        started_at: DateTime<Utc>,
    },
    Identity {
        session_id: Uuid,
        hardware_id: String,
        resolved_at: DateTime<Utc>,
    },
    Stage {
        session_id: Uuid,
        result: StageResult,
    },
    SessionFinished {
        session_id: Uuid,
        status: TerminalStatus,
        finished_at: DateTime<Utc>,
    },
}

impl AuditRecord {
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        match self {
            AuditRecord::SessionStarted { session_id, .. }
            | AuditRecord::Identity { session_id, .. }
            | AuditRecord::Stage { session_id, .. }
            | AuditRecord::SessionFinished { session_id, .. } => *session_id,
        }
    }
}

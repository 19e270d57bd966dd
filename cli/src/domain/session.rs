//! Session state machine.
//!
//! `SessionState` is the single writer over a session's progress. It accepts
//! stages only in pipeline order, only after the previous stage advanced, and
//! nothing at all once a terminal status has been set.

use std::fmt;

use chrono::{DateTime, Utc};
use outpost_common::{StageName, StageResult, TerminalStatus};
use uuid::Uuid;

use crate::domain::error::TransitionError;
use crate::domain::identity::DeviceIdentity;

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// The named stage has begun (and possibly finished successfully).
    Stage(StageName),
    Completed,
    Failed,
    Cancelled,
}

impl SessionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => f.write_str("idle"),
            SessionPhase::Stage(stage) => write!(f, "{stage}"),
            SessionPhase::Completed => f.write_str("completed"),
            SessionPhase::Failed => f.write_str("failed"),
            SessionPhase::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    session_id: Uuid,
    phase: SessionPhase,
    pending: Option<StageName>,
    history: Vec<StageResult>,
    started_at: DateTime<Utc>,
    cancel_requested: bool,
    identity: Option<DeviceIdentity>,
}

impl SessionState {
    #[must_use]
    pub fn new(session_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Idle,
            pending: None,
            history: Vec::new(),
            started_at,
            cancel_requested: false,
            identity: None,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn history(&self) -> &[StageResult] {
        &self.history
    }

    #[must_use]
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// The stage that may begin next, if any.
    #[must_use]
    pub fn expected_next(&self) -> Option<StageName> {
        if self.pending.is_some() {
            return None;
        }
        match self.phase {
            SessionPhase::Idle => Some(StageName::Connecting),
            SessionPhase::Stage(stage) if self.last_advanced(stage) => stage.next(),
            _ => None,
        }
    }

    /// Enter `stage`.
    ///
    /// # Errors
    ///
    /// Rejects anything but the next stage in pipeline order, and any stage
    /// after a terminal status.
    pub fn begin(&mut self, stage: StageName) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError::AlreadyFinished(self.phase));
        }
        if self.expected_next() != Some(stage) {
            return Err(TransitionError::OutOfOrder {
                phase: self.phase,
                requested: stage,
            });
        }
        self.phase = SessionPhase::Stage(stage);
        self.pending = Some(stage);
        Ok(())
    }

    /// Append the result of the in-progress stage. Results are never
    /// modified once appended.
    ///
    /// # Errors
    ///
    /// Rejects results for a stage that is not in progress.
    pub fn record(&mut self, result: StageResult) -> Result<(), TransitionError> {
        let Some(expected) = self.pending else {
            return Err(TransitionError::NoStageInProgress(result.stage));
        };
        if expected != result.stage {
            return Err(TransitionError::ResultMismatch {
                expected,
                got: result.stage,
            });
        }
        self.pending = None;
        self.history.push(result);
        Ok(())
    }

    pub fn mark_cancel_requested(&mut self) {
        self.cancel_requested = true;
    }

    pub fn set_identity(&mut self, identity: DeviceIdentity) {
        self.identity = Some(identity);
    }

    /// Move to a terminal phase. `Completed` is only reachable once
    /// `Deploying` has advanced; `Failed` and `Cancelled` from any
    /// non-terminal phase without an unrecorded stage.
    ///
    /// # Errors
    ///
    /// Rejects a second terminal status and a premature `Completed`.
    pub fn finish(&mut self, status: &TerminalStatus) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError::AlreadyFinished(self.phase));
        }
        if let Some(stage) = self.pending {
            return Err(TransitionError::StageUnrecorded(stage));
        }
        self.phase = match status {
            TerminalStatus::Completed => {
                if self.phase != SessionPhase::Stage(StageName::Deploying)
                    || !self.last_advanced(StageName::Deploying)
                {
                    return Err(TransitionError::IncompletePipeline(self.phase));
                }
                SessionPhase::Completed
            }
            TerminalStatus::Failed { .. } => SessionPhase::Failed,
            TerminalStatus::Cancelled => SessionPhase::Cancelled,
        };
        Ok(())
    }

    /// Consume the state, handing back the stage history.
    #[must_use]
    pub fn into_history(self) -> Vec<StageResult> {
        self.history
    }

    fn last_advanced(&self, stage: StageName) -> bool {
        self.history
            .last()
            .is_some_and(|r| r.stage == stage && r.outcome.advances())
    }
}

//! The provisioning pipeline.
//!
//! `StageOrchestrator::run` drives one session through every stage in order.
//! Each stage runs under its retry policy, and its result is recorded in the
//! session state, appended to the audit log and published to observers
//! before the next stage begins. The connection opened by `Authenticating`
//! is closed on every path out of the pipeline.

use std::future::{Future, ready};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use outpost_common::{
    AuditRecord, ConnectivityConfig, DeployConfig, IdentityConfig, NetworkConfig,
    ProvisionConfig, RetryConfig, SessionEvent, StageName, StageOutcome, StageResult,
    TerminalStatus,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::cancel::CancelToken;
use crate::application::ports::{AuditSink, RemoteShell, RemoteTransport};
use crate::application::retry::{Attempted, RetryPolicy};
use crate::application::services::connectivity::verify_connectivity;
use crate::application::services::deploy::{DeployReport, deploy, stage_deadline};
use crate::application::services::identity::resolve_identity;
use crate::application::services::network::{NetworkReport, configure_network};
use crate::domain::deploy::Payload;
use crate::domain::{
    AuthorizationSet, AuthorizedDevice, ConfigError, DeviceIdentity, ProvisionError,
    SessionState, Target, authorize,
};

/// Everything a session needs besides the target and its collaborators.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub authorized: AuthorizationSet,
    pub identity: IdentityConfig,
    pub network: Option<NetworkConfig>,
    pub connectivity: ConnectivityConfig,
    pub deploy: Option<DeployPlan>,
    pub retry: RetryConfig,
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub config: DeployConfig,
    pub payload: Option<Payload>,
}

impl SessionPlan {
    /// Build a plan from a loaded configuration. `payload` holds the bytes of
    /// `deploy.payload` when one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if an authorized device id does not normalize.
    pub fn from_config(
        config: &ProvisionConfig,
        payload: Option<Payload>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            authorized: AuthorizationSet::new(&config.authorized_devices)?,
            identity: config.identity.clone(),
            network: config.network.clone(),
            connectivity: config.connectivity.clone(),
            deploy: config.deploy.clone().map(|config| DeployPlan { config, payload }),
            retry: config.retry.clone(),
            probe_timeout: Duration::from_secs(config.target.probe_timeout_secs),
        })
    }

    fn policy(&self, stage: StageName) -> RetryPolicy {
        RetryPolicy::from_settings(&self.retry.for_stage(stage))
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub status: TerminalStatus,
    pub history: Vec<StageResult>,
    pub identity: Option<DeviceIdentity>,
    pub audit_path: Option<PathBuf>,
    /// Cancellation was requested at some point, even if the session went on
    /// to finish its last stage.
    pub cancel_requested: bool,
}

pub struct StageOrchestrator<'a, T, A> {
    transport: &'a T,
    audit: &'a A,
    plan: &'a SessionPlan,
    cancel: CancelToken,
    events: Option<UnboundedSender<SessionEvent>>,
}

impl<'a, T, A> StageOrchestrator<'a, T, A>
where
    T: RemoteTransport,
    A: AuditSink,
{
    #[must_use]
    pub fn new(transport: &'a T, audit: &'a A, plan: &'a SessionPlan, cancel: CancelToken) -> Self {
        Self {
            transport,
            audit,
            plan,
            cancel,
            events: None,
        }
    }

    /// Publish stage and terminal events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run one session against `target`. Always returns a report; the
    /// terminal status says how the session ended.
    pub async fn run(self, target: &Target) -> SessionReport {
        let session_id = Uuid::new_v4();
        let span = info_span!("session", %session_id, target = %target.display_name());
        async move {
            let mut state = SessionState::new(session_id, Utc::now());
            info!("session started");
            let outcome = match self.audit.append(&AuditRecord::SessionStarted {
                session_id,
                target: target.display_name(),
                started_at: state.started_at(),
            }) {
                Ok(()) => self.drive(&mut state, target).await,
                Err(e) => Err(audit_unavailable(&e)),
            };
            let status = match outcome {
                Ok(()) => TerminalStatus::Completed,
                Err(e) => terminal_status(&e),
            };
            self.finish(state, status)
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, state: &mut SessionState, target: &Target) -> Result<(), ProvisionError> {
        let transport = self.transport;
        let probe_timeout = self.plan.probe_timeout;
        self.stage(
            state,
            StageName::Connecting,
            self.plan
                .policy(StageName::Connecting)
                .execute(&self.cancel, move || transport.probe(target, probe_timeout)),
            |&()| format!("{}:{} accepts connections", target.address, target.port),
        )
        .await?;

        let (connection, result) = self
            .execute_stage(
                state,
                StageName::Authenticating,
                self.plan
                    .policy(StageName::Authenticating)
                    .execute(&self.cancel, move || transport.connect(target)),
                |_| format!("authenticated as {}", target.user),
            )
            .await?;
        let committed = self.commit(state, result);
        let mut connection = connection?;

        let outcome = match committed {
            Ok(()) => self.connected(state, &connection).await,
            Err(e) => Err(e),
        };
        if let Err(e) = connection.close().await {
            warn!(error = %e, "closing connection failed");
        }
        outcome
    }

    /// Stages that need the open connection.
    async fn connected(
        &self,
        state: &mut SessionState,
        conn: &T::Connection,
    ) -> Result<(), ProvisionError> {
        let plan = self.plan;
        let cancel = &self.cancel;

        let identity = self
            .stage(
                state,
                StageName::ResolvingIdentity,
                plan.policy(StageName::ResolvingIdentity)
                    .execute(cancel, move || resolve_identity(conn, &plan.identity)),
                |id: &DeviceIdentity| format!("hardware id {id}"),
            )
            .await?;
        self.bind_identity(state, &identity)?;

        let device = self
            .stage(
                state,
                StageName::Authorizing,
                ready(Attempted {
                    result: authorize(&identity, &plan.authorized),
                    attempts: 1,
                }),
                |d: &AuthorizedDevice| format!("{} is authorized", d.identity()),
            )
            .await?;
        let device = &device;

        match &plan.network {
            Some(network) => {
                self.stage(
                    state,
                    StageName::ConfiguringNetwork,
                    plan.policy(StageName::ConfiguringNetwork)
                        .execute(cancel, move || configure_network(conn, device, network)),
                    NetworkReport::summary,
                )
                .await?;
            }
            None => self.skip(state, StageName::ConfiguringNetwork, "no network settings")?,
        }

        self.stage(
            state,
            StageName::VerifyingConnectivity,
            plan.policy(StageName::VerifyingConnectivity)
                .execute(cancel, move || verify_connectivity(conn, &plan.connectivity)),
            |cmd: &String| format!("`{cmd}` succeeded"),
        )
        .await?;

        match &plan.deploy {
            Some(dp) => {
                let deadline = stage_deadline(&dp.config);
                self.stage(
                    state,
                    StageName::Deploying,
                    plan.policy(StageName::Deploying).execute(cancel, move || {
                        deploy(conn, device, &dp.config, dp.payload.as_ref(), deadline, cancel)
                    }),
                    DeployReport::summary,
                )
                .await?;
            }
            None => self.skip(state, StageName::Deploying, "no deploy settings")?,
        }
        Ok(())
    }

    /// Run a stage body and commit its result.
    async fn stage<V, F>(
        &self,
        state: &mut SessionState,
        stage: StageName,
        body: F,
        describe: impl FnOnce(&V) -> String,
    ) -> Result<V, ProvisionError>
    where
        F: Future<Output = Attempted<V>>,
    {
        let (value, result) = self.execute_stage(state, stage, body, describe).await?;
        self.commit(state, result)?;
        value
    }

    /// Check for cancellation at the boundary, enter the stage and run its
    /// body. The returned result is not yet committed.
    async fn execute_stage<V, F>(
        &self,
        state: &mut SessionState,
        stage: StageName,
        body: F,
        describe: impl FnOnce(&V) -> String,
    ) -> Result<(Result<V, ProvisionError>, StageResult), ProvisionError>
    where
        F: Future<Output = Attempted<V>>,
    {
        self.check_cancel(state)?;
        state.begin(stage)?;

        let started_at = Utc::now();
        info!(%stage, "stage started");
        let Attempted { result, attempts } =
            body.instrument(info_span!("stage", %stage)).await;
        let ended_at = Utc::now();

        let stage_result = match &result {
            Ok(value) => StageResult {
                stage,
                outcome: StageOutcome::Success,
                attempts,
                started_at,
                ended_at,
                error_kind: None,
                error_cause: None,
                summary: describe(value),
            },
            Err(e) => StageResult {
                stage,
                outcome: if matches!(e, ProvisionError::Cancelled) {
                    StageOutcome::Cancelled
                } else {
                    StageOutcome::Failed
                },
                attempts,
                started_at,
                ended_at,
                error_kind: Some(e.kind()),
                error_cause: e.cause_kind(),
                summary: e.to_string(),
            },
        };
        match &stage_result.error_kind {
            None => info!(%stage, attempts, "stage succeeded"),
            Some(kind) => warn!(%stage, attempts, %kind, "stage did not succeed"),
        }
        Ok((result, stage_result))
    }

    /// Record a `Skipped` result for a stage with nothing configured.
    fn skip(
        &self,
        state: &mut SessionState,
        stage: StageName,
        reason: &str,
    ) -> Result<(), ProvisionError> {
        self.check_cancel(state)?;
        state.begin(stage)?;
        let now = Utc::now();
        info!(%stage, reason, "stage skipped");
        self.commit(
            state,
            StageResult {
                stage,
                outcome: StageOutcome::Skipped,
                attempts: 0,
                started_at: now,
                ended_at: now,
                error_kind: None,
                error_cause: None,
                summary: reason.to_string(),
            },
        )
    }

    /// Append to history, persist, then publish.
    fn commit(&self, state: &mut SessionState, result: StageResult) -> Result<(), ProvisionError> {
        let event = SessionEvent::Stage {
            stage: result.stage,
            outcome: result.outcome,
            timestamp: result.ended_at,
        };
        let record = AuditRecord::Stage {
            session_id: state.session_id(),
            result: result.clone(),
        };
        state.record(result)?;
        self.audit
            .append(&record)
            .map_err(|e| audit_unavailable(&e))?;
        self.emit(event);
        Ok(())
    }

    fn bind_identity(
        &self,
        state: &mut SessionState,
        identity: &DeviceIdentity,
    ) -> Result<(), ProvisionError> {
        state.set_identity(identity.clone());
        self.audit
            .bind_identity(identity)
            .map_err(|e| audit_unavailable(&e))?;
        self.audit
            .append(&AuditRecord::Identity {
                session_id: state.session_id(),
                hardware_id: identity.to_string(),
                resolved_at: Utc::now(),
            })
            .map_err(|e| audit_unavailable(&e))
    }

    fn check_cancel(&self, state: &mut SessionState) -> Result<(), ProvisionError> {
        if self.cancel.is_cancelled() {
            state.mark_cancel_requested();
            return Err(ProvisionError::Cancelled);
        }
        Ok(())
    }

    fn finish(&self, mut state: SessionState, mut status: TerminalStatus) -> SessionReport {
        if self.cancel.is_cancelled() {
            state.mark_cancel_requested();
        }
        if let Err(e) = state.finish(&status) {
            error!(error = %e, "invalid terminal transition");
            status = terminal_status(&ProvisionError::InvalidTransition(e));
        }
        let finished = AuditRecord::SessionFinished {
            session_id: state.session_id(),
            status: status.clone(),
            finished_at: Utc::now(),
        };
        if let Err(e) = self.audit.append(&finished) {
            error!(error = %e, "could not write closing audit record");
            if status.is_success() {
                status = terminal_status(&audit_unavailable(&e));
            }
        }

        match &status {
            TerminalStatus::Completed => info!("session completed"),
            TerminalStatus::Cancelled => warn!("session cancelled"),
            TerminalStatus::Failed { kind, message, .. } => {
                error!(%kind, %message, "session failed");
            }
        }
        self.emit(SessionEvent::Finished {
            status: status.clone(),
            timestamp: Utc::now(),
        });

        let session_id = state.session_id();
        let identity = state.identity().cloned();
        let cancel_requested = state.cancel_requested();
        SessionReport {
            session_id,
            status,
            history: state.into_history(),
            identity,
            audit_path: self.audit.location(),
            cancel_requested,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            // A closed channel only means nobody is watching.
            let _ = tx.send(event);
        }
    }
}

fn audit_unavailable(e: &anyhow::Error) -> ProvisionError {
    ProvisionError::AuditUnavailable(format!("{e:#}"))
}

fn terminal_status(e: &ProvisionError) -> TerminalStatus {
    match e {
        ProvisionError::Cancelled => TerminalStatus::Cancelled,
        other => TerminalStatus::Failed {
            kind: other.kind(),
            cause: other.cause_kind(),
            message: other.to_string(),
        },
    }
}

//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod cancel;
pub mod ports;
pub mod retry;
pub mod services;

pub use cancel::CancelToken;
pub use ports::{AuditSink, CommandRunner, ConfigStore, RemoteShell, RemoteTransport};
pub use retry::{Attempted, RetryPolicy};
pub use services::orchestrator::{DeployPlan, SessionPlan, SessionReport, StageOrchestrator};

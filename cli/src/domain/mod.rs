//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod audit;
pub mod config;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod network;
pub mod session;
pub mod shell;
pub mod target;

pub use config::validate_config;
pub use error::{ConfigError, ProvisionError, TransitionError};
pub use identity::{AuthorizationSet, AuthorizedDevice, DeviceIdentity, authorize};
pub use session::{SessionPhase, SessionState};
pub use target::{Credential, Target};

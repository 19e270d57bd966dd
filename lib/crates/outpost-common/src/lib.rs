pub mod audit;
pub mod config;
pub mod types;

pub use audit::AuditRecord;
pub use config::{
    AuditConfig, BackoffKind, ConnectivityConfig, CredentialConfig, DeployConfig, IdentityConfig,
    LanConfig, NetworkConfig, ProvisionConfig, RetryConfig, RetryOverride, RetrySettings,
    TargetConfig, WanConfig, WanProto,
};
pub use types::*;

//! Provisioning configuration validation.

use outpost_common::{ProvisionConfig, WanProto};

use crate::domain::error::ConfigError;
use crate::domain::identity::AuthorizationSet;

/// Check a loaded configuration for values that would make a session fail
/// for reasons unrelated to the device.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_config(config: &ProvisionConfig) -> Result<(), ConfigError> {
    if config.target.address.trim().is_empty() {
        return Err(ConfigError::MissingAddress);
    }
    let authorized = AuthorizationSet::new(&config.authorized_devices)?;
    if authorized.is_empty() {
        return Err(ConfigError::NoAuthorizedDevices);
    }

    let credential = &config.target.credential;
    if credential.key_file.is_some() == credential.password_env.is_some() {
        return Err(ConfigError::AmbiguousCredential);
    }

    if config.retry.default.max_attempts == 0 {
        return Err(ConfigError::ZeroAttempts("retry.default".to_string()));
    }
    for (stage, o) in &config.retry.stages {
        if o.max_attempts == Some(0) {
            return Err(ConfigError::ZeroAttempts(format!("retry.stages.{stage}")));
        }
    }

    if let Some(network) = &config.network
        && network.wan.proto == WanProto::Static
    {
        if network.wan.ipaddr.is_none() {
            return Err(ConfigError::IncompleteStaticWan("ipaddr"));
        }
        if network.wan.netmask.is_none() {
            return Err(ConfigError::IncompleteStaticWan("netmask"));
        }
    }

    if let Some(deploy) = &config.deploy
        && deploy.install_command.trim().is_empty()
    {
        return Err(ConfigError::MissingInstallCommand);
    }
    Ok(())
}

//! Infrastructure implementation of the `ConfigStore` port, plus the helpers
//! that turn a loaded configuration into session inputs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use outpost_common::{DeployConfig, ProvisionConfig, TargetConfig};

use crate::application::ports::ConfigStore;
use crate::domain::deploy::Payload;
use crate::domain::{Credential, Target, validate_config};
use crate::infra::audit::default_audit_dir;
use crate::infra::ssh::KnownHostsFile;

/// Production `ConfigStore` reading a YAML file.
///
/// Path priority: explicit `--config`, then `OUTPOST_CONFIG`, then
/// `~/.outpost/config.yaml`.
pub struct YamlConfigStore {
    explicit: Option<PathBuf>,
    overrides: TargetOverrides,
}

/// Command-line replacements for `target` settings.
#[derive(Debug, Clone, Default)]
pub struct TargetOverrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
}

impl TargetOverrides {
    pub fn apply(&self, target: &mut TargetConfig) {
        if let Some(address) = &self.address {
            target.address.clone_from(address);
        }
        if let Some(port) = self.port {
            target.port = port;
        }
        if let Some(user) = &self.user {
            target.user.clone_from(user);
        }
    }
}

impl YamlConfigStore {
    #[must_use]
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            overrides: TargetOverrides::default(),
        }
    }

    /// Apply `overrides` to every configuration read from this store.
    #[must_use]
    pub fn with_overrides(mut self, overrides: TargetOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Parse the configuration file and apply overrides, without validating.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not parse.
    pub fn read(&self) -> Result<ProvisionConfig> {
        let path = self.path()?;
        if !path.exists() {
            anyhow::bail!(
                "no configuration at {}. Create it or pass --config <file>",
                path.display()
            );
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut config: ProvisionConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
        self.overrides.apply(&mut config.target);
        Ok(config)
    }

    /// Directory that relative paths in the configuration resolve against.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration path cannot be determined.
    pub fn base_dir(&self) -> Result<PathBuf> {
        let path = self.path()?;
        Ok(path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf))
    }
}

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<ProvisionConfig> {
        let config = self.read()?;
        let path = self.path()?;
        validate_config(&config).with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    fn path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit {
            return Ok(path.clone());
        }
        if let Ok(val) = std::env::var("OUTPOST_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".outpost").join("config.yaml"))
    }
}

/// Build the session target, reading a password from the environment
/// variable named by `credential.password_env`.
///
/// # Errors
///
/// Returns an error if the password variable is unset or no credential is
/// configured.
pub fn resolve_target(config: &TargetConfig) -> Result<Target> {
    let credential = match (&config.credential.key_file, &config.credential.password_env) {
        (Some(key), None) => Credential::KeyFile(key.clone()),
        (None, Some(var)) => Credential::Password(
            std::env::var(var)
                .with_context(|| format!("password variable {var} is not set"))?,
        ),
        _ => anyhow::bail!("target.credential must set exactly one of key_file or password_env"),
    };
    Ok(Target {
        address: config.address.clone(),
        port: config.port,
        user: config.user.clone(),
        credential,
    })
}

/// Read the configured payload. Relative paths resolve against `base`
/// (the configuration file's directory).
///
/// # Errors
///
/// Returns an error if the payload file cannot be read.
pub fn load_payload(deploy: &DeployConfig, base: &Path) -> Result<Option<Payload>> {
    let Some(path) = &deploy.payload else {
        return Ok(None);
    };
    let path = if path.is_relative() {
        base.join(path)
    } else {
        path.clone()
    };
    let bytes =
        std::fs::read(&path).with_context(|| format!("cannot read payload {}", path.display()))?;
    Ok(Some(Payload::new(bytes)))
}

/// Audit directory from the configuration, or `~/.outpost/audit`.
///
/// # Errors
///
/// Returns an error if no directory is configured and the home directory
/// cannot be determined.
pub fn audit_dir(config: &ProvisionConfig) -> Result<PathBuf> {
    match &config.audit.dir {
        Some(dir) => Ok(dir.clone()),
        None => default_audit_dir(),
    }
}

/// Known-hosts file from the configuration, or `~/.outpost/known_hosts`.
///
/// # Errors
///
/// Returns an error if no file is configured and the home directory cannot
/// be determined.
pub fn known_hosts(config: &TargetConfig) -> Result<KnownHostsFile> {
    match &config.known_hosts {
        Some(path) => Ok(KnownHostsFile::with_path(path.clone())),
        None => KnownHostsFile::new(),
    }
}

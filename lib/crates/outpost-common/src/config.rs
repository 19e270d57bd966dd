//! Provisioning configuration schema (`~/.outpost/config.yaml`).
//!
//! Every section except `target` and `authorized_devices` has defaults, so a
//! minimal file only names the device and the hardware ids allowed onto it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::StageName;

/// Top-level provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub target: TargetConfig,
    /// Hardware ids accepted for deployment. Normalized on load.
    #[serde(default)]
    pub authorized_devices: Vec<String>,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// `None` skips the network stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    /// `None` skips the deploy stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// SSH coordinates of the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub credential: CredentialConfig,
    /// Known-hosts file used to pin the device host key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts: Option<PathBuf>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Either a key file or the name of an environment variable holding a
/// password. A literal password is never stored in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Remote command printing the hardware id on its first non-empty line.
    #[serde(default = "default_identity_command")]
    pub command: String,
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            command: default_identity_command(),
            timeout_secs: default_command_timeout(),
        }
    }
}

/// Desired WAN/LAN settings, applied through `uci`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub wan: WanConfig,
    pub lan: LanConfig,
    #[serde(default = "default_reload_command")]
    pub reload_command: String,
    #[serde(default = "default_network_command_timeout")]
    pub command_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WanProto {
    Dhcp,
    Static,
}

impl WanProto {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WanProto::Dhcp => "dhcp",
            WanProto::Static => "static",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WanConfig {
    #[serde(default = "default_wan_section")]
    pub section: String,
    pub proto: WanProto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipaddr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanConfig {
    #[serde(default = "default_lan_section")]
    pub section: String,
    pub ipaddr: String,
    #[serde(default = "default_lan_netmask")]
    pub netmask: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectivityConfig {
    /// Host pinged from the device.
    #[serde(default = "default_connectivity_host")]
    pub host: String,
    /// Replaces the ping probe when set. Exit status 0 means reachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default = "default_connectivity_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            host: default_connectivity_host(),
            command: None,
            timeout_secs: default_connectivity_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Local payload uploaded before the install command runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PathBuf>,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    /// Opaque remote install command. Its exit status decides success.
    pub install_command: String,
    #[serde(default = "default_status_file")]
    pub status_file: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_deploy_deadline")]
    pub deadline_secs: u64,
    #[serde(default = "default_deploy_command_timeout")]
    pub command_timeout_secs: u64,
}

/// Backoff shape between attempts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Retry parameters for one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Bound on the total time spent retrying one stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffKind::default(),
            deadline_secs: None,
        }
    }
}

/// Per-stage override. Unset fields inherit from `retry.default`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default)]
    pub default: RetrySettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<StageName, RetryOverride>,
}

impl RetryConfig {
    /// Effective settings for `stage`: the default with any override applied.
    #[must_use]
    pub fn for_stage(&self, stage: StageName) -> RetrySettings {
        let base = self.default;
        let Some(o) = self.stages.get(&stage) else {
            return base;
        };
        RetrySettings {
            max_attempts: o.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: o.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: o.max_delay_ms.unwrap_or(base.max_delay_ms),
            backoff: o.backoff.unwrap_or(base.backoff),
            deadline_secs: o.deadline_secs.or(base.deadline_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    /// Audit log directory. Defaults to `~/.outpost/audit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    "root".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_identity_command() -> String {
    "cat /sys/class/net/eth0/address".to_string()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_reload_command() -> String {
    "/etc/init.d/network reload".to_string()
}

fn default_network_command_timeout() -> u64 {
    15
}

fn default_wan_section() -> String {
    "wan".to_string()
}

fn default_lan_section() -> String {
    "lan".to_string()
}

fn default_lan_netmask() -> String {
    "255.255.255.0".to_string()
}

fn default_connectivity_host() -> String {
    "1.1.1.1".to_string()
}

fn default_connectivity_timeout() -> u64 {
    5
}

fn default_remote_path() -> String {
    "/tmp/outpost-payload".to_string()
}

fn default_status_file() -> String {
    "/tmp/outpost-deploy.status".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_deploy_deadline() -> u64 {
    600
}

fn default_deploy_command_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

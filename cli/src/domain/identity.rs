//! Device identity normalization and authorization.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::error::{ConfigError, ProvisionError};

/// Normalized hardware identifier of the device.
///
/// Separators (`:`, `-`, `.`) and whitespace are stripped and the rest is
/// upper-cased, so `aa:bb:cc:dd:ee:ff` and `AA-BB-CC-DD-EE-FF` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Normalize a raw identifier. Returns `None` when nothing alphanumeric
    /// remains or a character outside `[0-9A-Za-z]` survives stripping.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Self> {
        let id: String = raw
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(id))
    }

    /// Parse the output of the identity command: the first non-empty line.
    ///
    /// # Errors
    ///
    /// Returns `IdentityUnavailable` when the output is empty or the line does
    /// not normalize.
    pub fn from_command_output(stdout: &str) -> Result<Self, ProvisionError> {
        let line = stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| ProvisionError::IdentityUnavailable("command printed nothing".into()))?;
        Self::normalize(line).ok_or_else(|| {
            ProvisionError::IdentityUnavailable(format!("unrecognised hardware id {line:?}"))
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hardware ids allowed to receive state-mutating stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSet(BTreeSet<DeviceIdentity>);

impl AuthorizationSet {
    /// Build the set, normalizing every entry with the identity rule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeviceId` for the first entry that does not normalize.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        entries
            .into_iter()
            .map(|raw| {
                DeviceIdentity::normalize(raw.as_ref())
                    .ok_or_else(|| ConfigError::InvalidDeviceId(raw.as_ref().to_string()))
            })
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.0.contains(identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Proof that a device passed authorization.
///
/// Only [`authorize`] can construct one, and the network and deploy stages
/// take it by reference, so neither can be invoked for an unchecked device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedDevice {
    identity: DeviceIdentity,
}

impl AuthorizedDevice {
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

/// Check `identity` against the allow-list.
///
/// # Errors
///
/// Returns `Unauthorized` when the identity is not in `set`.
pub fn authorize(
    identity: &DeviceIdentity,
    set: &AuthorizationSet,
) -> Result<AuthorizedDevice, ProvisionError> {
    if set.contains(identity) {
        Ok(AuthorizedDevice {
            identity: identity.clone(),
        })
    } else {
        Err(ProvisionError::Unauthorized {
            hardware_id: identity.to_string(),
        })
    }
}

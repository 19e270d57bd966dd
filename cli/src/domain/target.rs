//! The device being provisioned.

use std::fmt;
use std::path::PathBuf;

/// SSH coordinates of the device. Immutable for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
}

impl Target {
    /// `user@address:port`, safe to log.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}@{}:{}", self.user, self.address, self.port)
    }

    /// `user@address` destination for the ssh client.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// How the session authenticates. Passwords never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    KeyFile(PathBuf),
    Password(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

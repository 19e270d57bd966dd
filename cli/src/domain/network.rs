//! OpenWrt `uci` network settings: desired state, parsing and diffing.
//!
//! Pure functions only. The application service runs the commands these
//! helpers produce and feeds the output back in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use outpost_common::{NetworkConfig, WanProto};
use regex::Regex;

use crate::domain::shell::shell_quote;

/// `network.<section>.<option>=<value>` lines of `uci show`.
static UCI_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^network\.([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)=(.*)$").expect("valid regex")
});

/// One single-quoted token of a uci value (lists print several).
static UCI_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"'((?:[^']|'\\'')*)'").expect("valid regex")
});

/// Persist staged uci changes.
pub const COMMIT_COMMAND: &str = "uci commit network";

/// `(section, option)` key of a uci option.
pub type OptionKey = (String, String);

/// Current option values, keyed by `(section, option)`.
pub type UciSettings = BTreeMap<OptionKey, String>;

/// An option's desired value. `None` means the option must be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredOption {
    pub section: String,
    pub option: String,
    pub value: Option<String>,
}

impl DesiredOption {
    fn set(section: &str, option: &str, value: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            option: option.to_string(),
            value: Some(value.into()),
        }
    }

    fn absent(section: &str, option: &str) -> Self {
        Self {
            section: section.to_string(),
            option: option.to_string(),
            value: None,
        }
    }

    fn key(&self) -> OptionKey {
        (self.section.clone(), self.option.clone())
    }
}

/// One command needed to move the device towards the desired settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciChange {
    Set {
        section: String,
        option: String,
        value: String,
    },
    Delete {
        section: String,
        option: String,
    },
}

impl UciChange {
    #[must_use]
    pub fn command(&self) -> String {
        match self {
            UciChange::Set {
                section,
                option,
                value,
            } => format!("uci set network.{section}.{option}={}", shell_quote(value)),
            UciChange::Delete { section, option } => {
                format!("uci -q delete network.{section}.{option}")
            }
        }
    }
}

impl fmt::Display for UciChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciChange::Set {
                section,
                option,
                value,
            } => write!(f, "{section}.{option}={value}"),
            UciChange::Delete { section, option } => write!(f, "{section}.{option} (delete)"),
        }
    }
}

/// Settings the device must end up with.
#[must_use]
pub fn desired_options(config: &NetworkConfig) -> Vec<DesiredOption> {
    let wan = &config.wan;
    let lan = &config.lan;
    let w = wan.section.as_str();
    let l = lan.section.as_str();

    let mut options = vec![DesiredOption::set(w, "proto", wan.proto.as_str())];
    match wan.proto {
        WanProto::Static => {
            for (name, value) in [
                ("ipaddr", &wan.ipaddr),
                ("netmask", &wan.netmask),
                ("gateway", &wan.gateway),
            ] {
                options.push(match value {
                    Some(v) => DesiredOption::set(w, name, v.as_str()),
                    None => DesiredOption::absent(w, name),
                });
            }
        }
        WanProto::Dhcp => {
            for name in ["ipaddr", "netmask", "gateway"] {
                options.push(DesiredOption::absent(w, name));
            }
        }
    }
    options.push(if wan.dns.is_empty() {
        DesiredOption::absent(w, "dns")
    } else {
        DesiredOption::set(w, "dns", wan.dns.join(" "))
    });

    options.push(DesiredOption::set(l, "proto", "static"));
    options.push(DesiredOption::set(l, "ipaddr", lan.ipaddr.as_str()));
    options.push(DesiredOption::set(l, "netmask", lan.netmask.as_str()));
    options
}

/// Sections touched by the desired settings, in first-seen order.
#[must_use]
pub fn sections(desired: &[DesiredOption]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for d in desired {
        if !out.contains(&d.section) {
            out.push(d.section.clone());
        }
    }
    out
}

/// Read the current options of one section. Exits non-zero with no output
/// when the section does not exist yet.
#[must_use]
pub fn show_command(section: &str) -> String {
    format!("uci -q show network.{section}")
}

/// Parse `uci show` output into option values. List values are joined with
/// single spaces so they compare equal to the desired string form.
#[must_use]
pub fn parse_show(stdout: &str) -> UciSettings {
    let mut settings = UciSettings::new();
    for line in stdout.lines() {
        let Some(caps) = UCI_LINE_RE.captures(line.trim()) else {
            continue;
        };
        let raw = caps[3].trim();
        let tokens: Vec<String> = UCI_TOKEN_RE
            .captures_iter(raw)
            .map(|t| t[1].replace(r"'\''", "'"))
            .collect();
        let value = if tokens.is_empty() {
            raw.to_string()
        } else {
            tokens.join(" ")
        };
        settings.insert((caps[1].to_string(), caps[2].to_string()), value);
    }
    settings
}

/// Minimal ordered changes that turn `current` into `desired`.
#[must_use]
pub fn plan(desired: &[DesiredOption], current: &UciSettings) -> Vec<UciChange> {
    desired
        .iter()
        .filter_map(|d| {
            let have = current.get(&d.key());
            match (&d.value, have) {
                (Some(want), Some(have)) if want == have => None,
                (Some(want), _) => Some(UciChange::Set {
                    section: d.section.clone(),
                    option: d.option.clone(),
                    value: want.clone(),
                }),
                (None, Some(_)) => Some(UciChange::Delete {
                    section: d.section.clone(),
                    option: d.option.clone(),
                }),
                (None, None) => None,
            }
        })
        .collect()
}

/// Human description of every option that does not match, empty when the
/// read-back agrees with the desired settings.
#[must_use]
pub fn verify(desired: &[DesiredOption], readback: &UciSettings) -> Vec<String> {
    plan(desired, readback)
        .iter()
        .map(|change| match change {
            UciChange::Set {
                section, option, ..
            } => format!(
                "{section}.{option} is {:?}",
                readback
                    .get(&(section.clone(), option.clone()))
                    .map_or("unset", String::as_str)
            ),
            UciChange::Delete { section, option } => format!("{section}.{option} still set"),
        })
        .collect()
}

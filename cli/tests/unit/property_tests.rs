//! Property-based tests for identity normalization, quoting and uci diffs.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use outpost_cli::domain::DeviceIdentity;
use outpost_cli::domain::network::{DesiredOption, UciChange, UciSettings, parse_show, plan};
use outpost_cli::domain::shell::shell_quote;

// ============================================================================
// DeviceIdentity::normalize()
// ============================================================================

fn mac() -> impl Strategy<Value = [u8; 6]> {
    prop::array::uniform6(any::<u8>())
}

fn separator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(":"), Just("-"), Just(""), Just(" ")]
}

proptest! {
    /// Separator style and case never change the normalized identity.
    #[test]
    fn prop_mac_spellings_normalize_equal(bytes in mac(), sep in separator(), upper in any::<bool>()) {
        let canonical: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        let spelled = bytes
            .iter()
            .map(|b| if upper { format!("{b:02X}") } else { format!("{b:02x}") })
            .collect::<Vec<_>>()
            .join(sep);

        let id = DeviceIdentity::normalize(&spelled).expect("mac normalizes");
        prop_assert_eq!(id.as_str(), canonical.as_str());
    }

    /// Normalizing an already normalized identity is a no-op.
    #[test]
    fn prop_normalize_is_idempotent(raw in "[0-9a-fA-F:.-]{1,24}") {
        if let Some(id) = DeviceIdentity::normalize(&raw) {
            let again = DeviceIdentity::normalize(id.as_str()).expect("normalized id re-normalizes");
            prop_assert_eq!(again, id);
        }
    }
}

// ============================================================================
// shell_quote() / parse_show()
// ============================================================================

proptest! {
    /// A value set through `uci set` reads back unchanged from `uci show`.
    #[test]
    fn prop_quoted_value_reads_back(value in "[a-zA-Z0-9 '._-]{0,20}") {
        let line = format!("network.wan.hostname={}\n", shell_quote(&value));
        let settings = parse_show(&line);
        prop_assert_eq!(
            settings.get(&("wan".to_string(), "hostname".to_string())),
            Some(&value)
        );
    }
}

// ============================================================================
// plan()
// ============================================================================

const OPTIONS: [&str; 5] = ["proto", "ipaddr", "netmask", "gateway", "dns"];

fn desired() -> impl Strategy<Value = Vec<DesiredOption>> {
    prop::collection::vec(prop::option::of("[a-z0-9.]{1,8}"), OPTIONS.len()).prop_map(|values| {
        OPTIONS
            .iter()
            .zip(values)
            .map(|(option, value)| DesiredOption {
                section: "wan".to_string(),
                option: (*option).to_string(),
                value,
            })
            .collect()
    })
}

fn current() -> impl Strategy<Value = UciSettings> {
    prop::collection::vec(prop::option::of("[a-z0-9.]{1,8}"), OPTIONS.len()).prop_map(|values| {
        OPTIONS
            .iter()
            .zip(values)
            .filter_map(|(option, value)| {
                value.map(|v| (("wan".to_string(), (*option).to_string()), v))
            })
            .collect()
    })
}

fn apply(settings: &mut UciSettings, changes: &[UciChange]) {
    for change in changes {
        match change {
            UciChange::Set {
                section,
                option,
                value,
            } => {
                settings.insert((section.clone(), option.clone()), value.clone());
            }
            UciChange::Delete { section, option } => {
                settings.remove(&(section.clone(), option.clone()));
            }
        }
    }
}

proptest! {
    /// Applying a plan converges: planning again yields nothing to do.
    #[test]
    fn prop_applied_plan_converges(desired in desired(), mut current in current()) {
        let changes = plan(&desired, &current);
        apply(&mut current, &changes);
        prop_assert!(plan(&desired, &current).is_empty());
    }

    /// Options that already match never appear in the plan.
    #[test]
    fn prop_plan_only_touches_differences(desired in desired(), current in current()) {
        for change in plan(&desired, &current) {
            let (UciChange::Set { section, option, .. } | UciChange::Delete { section, option }) =
                &change;
            let want = desired
                .iter()
                .find(|d| &d.section == section && &d.option == option)
                .and_then(|d| d.value.as_ref());
            prop_assert_ne!(want, current.get(&(section.clone(), option.clone())));
        }
    }
}

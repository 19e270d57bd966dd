//! Network configuration: diff, apply, read back.

use outpost_cli::application::services::network::configure_network;
use outpost_common::{ErrorKind, NetworkConfig};

use crate::helpers::{FULL_CONFIG, FakeDevice, authorized, config};

fn network() -> NetworkConfig {
    config(FULL_CONFIG).network.unwrap()
}

#[tokio::test]
async fn applies_only_the_difference() {
    let device = FakeDevice::new();
    let report = configure_network(&device.shell(), &authorized(), &network())
        .await
        .unwrap();

    let applied: Vec<String> = report.changes.iter().map(ToString::to_string).collect();
    assert_eq!(
        applied,
        vec![
            "wan.proto=static",
            "wan.ipaddr=203.0.113.10",
            "wan.netmask=255.255.255.0",
            "wan.gateway=203.0.113.1",
            "wan.dns=1.1.1.1 9.9.9.9",
            "lan.ipaddr=10.10.0.1",
        ]
    );

    let state = device.state();
    assert_eq!(state.uci["wan.proto"], "static");
    assert_eq!(state.uci["lan.ipaddr"], "10.10.0.1");
    assert_eq!(state.commits, 1);
    assert!(
        state
            .commands
            .iter()
            .any(|c| c.starts_with("nohup sh -c '/etc/init.d/network reload'")),
        "{:?}",
        state.commands
    );
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let device = FakeDevice::new();
    let shell = device.shell();
    configure_network(&shell, &authorized(), &network())
        .await
        .unwrap();
    let after_first = device.state().uci.clone();

    let report = configure_network(&shell, &authorized(), &network())
        .await
        .unwrap();

    assert!(report.changes.is_empty());
    assert_eq!(report.summary(), "network already configured");
    let state = device.state();
    assert_eq!(state.uci, after_first);
    assert_eq!(state.commits, 1);
}

#[tokio::test]
async fn switching_to_dhcp_deletes_static_options() {
    let device = FakeDevice::new();
    let shell = device.shell();
    configure_network(&shell, &authorized(), &network())
        .await
        .unwrap();

    let mut dhcp = network();
    dhcp.wan.proto = outpost_common::WanProto::Dhcp;
    dhcp.wan.dns.clear();
    configure_network(&shell, &authorized(), &dhcp).await.unwrap();

    let state = device.state();
    assert_eq!(state.uci["wan.proto"], "dhcp");
    for gone in ["wan.ipaddr", "wan.netmask", "wan.gateway", "wan.dns"] {
        assert!(!state.uci.contains_key(gone), "{gone} still set");
    }
}

#[tokio::test]
async fn read_back_mismatch_fails_verification() {
    let device = FakeDevice::with(|d| d.sticky_uci = true);
    let err = configure_network(&device.shell(), &authorized(), &network())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationVerificationFailed);
    assert!(err.to_string().contains("wan.proto"), "{err}");
}

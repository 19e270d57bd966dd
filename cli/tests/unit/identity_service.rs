//! Identity resolution and authorization against a simulated device.

use outpost_cli::application::services::identity::resolve_identity;
use outpost_cli::domain::{AuthorizationSet, ProvisionError, authorize};
use outpost_common::{ErrorKind, IdentityConfig};

use crate::helpers::FakeDevice;

#[tokio::test]
async fn resolves_normalized_hardware_id() {
    let device = FakeDevice::new();
    let id = resolve_identity(&device.shell(), &IdentityConfig::default())
        .await
        .unwrap();
    assert_eq!(id.as_str(), "AABBCCDDEEFF");
}

#[tokio::test]
async fn failing_identity_command_is_unavailable() {
    let device = FakeDevice::new();
    let config = IdentityConfig {
        command: "cat /nonexistent".into(),
        ..IdentityConfig::default()
    };
    let err = resolve_identity(&device.shell(), &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityUnavailable);
    assert!(err.to_string().contains("exited with 127"), "{err}");
}

#[tokio::test]
async fn garbage_identity_is_unavailable() {
    let device = FakeDevice::with(|d| d.hardware_id = "??".into());
    let err = resolve_identity(&device.shell(), &IdentityConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityUnavailable);
}

#[tokio::test]
async fn unlisted_identity_is_unauthorized() {
    let device = FakeDevice::new();
    let id = resolve_identity(&device.shell(), &IdentityConfig::default())
        .await
        .unwrap();
    let set = AuthorizationSet::new(["11:22:33:44:55:66"]).unwrap();
    assert_eq!(
        authorize(&id, &set).unwrap_err(),
        ProvisionError::Unauthorized {
            hardware_id: "AABBCCDDEEFF".into()
        }
    );
}

#[tokio::test]
async fn listed_identity_in_another_notation_is_authorized() {
    let device = FakeDevice::new();
    let id = resolve_identity(&device.shell(), &IdentityConfig::default())
        .await
        .unwrap();
    let set = AuthorizationSet::new(["aabb.ccdd.eeff"]).unwrap();
    assert_eq!(authorize(&id, &set).unwrap().identity(), &id);
}

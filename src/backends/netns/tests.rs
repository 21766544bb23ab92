// ============================================================================
// File: src/backends/netns/tests.rs
// ----------------------------------------------------------------------------
// Test suite for the network namespace backend
// ============================================================================

use std::time::Duration;

use super::*;
use crate::backends::DirectoryImages;

async fn backend_or_skip() -> Option<NetnsBackend> {
    let config = BackendConfig::new("netns-test")
        .with_stop_grace(Duration::from_secs(1))
        .with_exec_timeout(Duration::from_secs(5));
    let privilege = PrivilegeManager::new(config.use_sudo, config.command_timeout);
    if !EnvironmentDetector::netns_supported(&privilege).await {
        eprintln!("Skipping: network namespaces not available");
        return None;
    }
    NetnsBackend::new(config).ok()
}

#[test]
fn namespace_names_are_session_scoped() {
    let Ok(a) = NetnsBackend::new(BackendConfig::new("a").with_namespace_prefix("lab")) else {
        return;
    };
    let Ok(b) = NetnsBackend::new(BackendConfig::new("b").with_namespace_prefix("lab")) else {
        return;
    };
    assert!(a.namespace_for("n1").starts_with("lab-"));
    assert!(a.namespace_for("n1").ends_with("-n1"));
    assert_ne!(a.namespace_for("n1"), b.namespace_for("n1"));
}

#[tokio::test]
async fn missing_image_fails_before_namespace_creation() {
    let root = tempfile::tempdir().expect("tempdir");
    let Ok(backend) = NetnsBackend::new(BackendConfig::new("img").with_sudo(false)) else {
        return;
    };
    let backend = backend.with_images(Arc::new(DirectoryImages::new(root.path())));

    let err = backend
        .create(NodeSpec::new("n1").with_image("absent:latest"))
        .await
        .expect("join")
        .expect_err("image is missing");
    assert!(matches!(err, BackendError::ImageUnavailable { .. }));
}

#[tokio::test]
async fn node_lifecycle() {
    let Some(backend) = backend_or_skip().await else {
        return;
    };

    let handle = backend
        .create(NodeSpec::new("life"))
        .await
        .expect("join")
        .expect("create");

    let result = backend
        .exec(&handle, vec!["ip".into(), "link".into(), "show".into(), "lo".into()])
        .await
        .expect("join")
        .expect("exec");
    assert!(result.is_success(), "{}", result.combined_output());

    backend.destroy(&handle).await.expect("join").expect("destroy");
    backend.destroy(&handle).await.expect("join").expect("second destroy");

    let err = backend
        .exec(&handle, vec!["true".into()])
        .await
        .expect("join")
        .expect_err("gone");
    assert!(matches!(err, BackendError::EndpointUnavailable { .. }));
}

#[tokio::test]
async fn init_that_exits_immediately_fails_launch() {
    let Some(backend) = backend_or_skip().await else {
        return;
    };

    let err = backend
        .create(NodeSpec::new("dies").with_command("exit 3"))
        .await
        .expect("join")
        .expect_err("init exits");
    assert!(matches!(err, BackendError::LaunchFailed { .. }));

    let listing = backend
        .privilege
        .run_checked(&["ip", "netns", "list"])
        .await
        .expect("list namespaces");
    let listing = String::from_utf8_lossy(&listing.stdout);
    assert!(!listing.contains(&backend.namespace_for("dies")));
}

#[tokio::test]
async fn exec_timeout_is_reported() {
    let Some(backend) = backend_or_skip().await else {
        return;
    };
    let handle = backend
        .create(NodeSpec::new("slow"))
        .await
        .expect("join")
        .expect("create");

    let err = backend
        .exec(&handle, vec!["sleep".into(), "30".into()])
        .await
        .expect("join")
        .expect_err("should time out");
    assert!(matches!(err, BackendError::ExecTimeout { .. }));

    backend.destroy(&handle).await.expect("join").expect("destroy");
}

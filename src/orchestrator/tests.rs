// ============================================================================
// File: src/orchestrator/tests.rs
// ----------------------------------------------------------------------------
// Test suite for orchestrator lifecycle, rollback and teardown ordering
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::*;
use crate::backends::{BackendConfig, BackendError, DirectoryImages, IsolationBackend, SimulatedBackend};
use crate::fabric::{FabricConfig, FabricError, LinkFabric, SimulatedFabric};
use crate::simulation::{FaultPlan, JournalEvent, SimulationJournal};
use crate::topology::{NodeSpec, ShapingPolicy, TopologyConfig, ValidationError};

struct Harness {
    backend: SimulatedBackend,
    fabric: SimulatedFabric,
    journal: SimulationJournal,
}

impl Harness {
    fn new(faults: FaultPlan) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let journal = SimulationJournal::new();
        let backend = SimulatedBackend::new(BackendConfig::new("sim").with_sudo(false))
            .with_journal(journal.clone())
            .with_faults(faults.clone());
        let fabric = SimulatedFabric::new(FabricConfig::new("sim").with_sudo(false))
            .with_journal(journal.clone())
            .with_faults(faults);
        Self {
            backend,
            fabric,
            journal,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::new(self.backend.clone()), Arc::new(self.fabric.clone()))
    }

    fn leaked(&self) -> usize {
        self.backend.live_count() + self.fabric.live_switches() + self.fabric.live_links()
    }
}

fn bw_delay() -> ShapingPolicy {
    ShapingPolicy::new()
        .with_bandwidth_mbit(1.0)
        .with_delay(Duration::from_millis(100))
}

/// n1/n2/n3 behind two switches, with a shaped switch-to-switch link.
fn declare_reference(orch: &mut Orchestrator) {
    for (name, ip) in [("n1", "10.0.0.1"), ("n2", "10.0.0.2"), ("n3", "10.0.0.3")] {
        orch.add_node(NodeSpec::new(name).with_address(ip.parse().expect("addr")))
            .expect("node");
    }
    orch.add_switch("s1").expect("s1");
    orch.add_switch("s2").expect("s2");
    orch.add_link("n1", "s1", None).expect("n1-s1");
    orch.add_link("s1", "s2", Some(bw_delay())).expect("s1-s2");
    orch.add_link("s2", "n2", None).expect("s2-n2");
    orch.add_link("s2", "n3", None).expect("s2-n3");
}

#[tokio::test]
async fn reference_topology_round_trip() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.validate().expect("valid");

    orch.realize().await.expect("realize");
    assert_eq!(orch.state(), OrchestratorState::Live);
    assert_eq!(orch.live_handle_count(), 9);
    assert_eq!(harness.backend.live_count(), 3);
    assert_eq!(harness.fabric.live_switches(), 2);
    assert_eq!(harness.fabric.live_links(), 4);

    let trunk = orch.link_between("s1", "s2").expect("declared");
    assert_eq!(orch.link_shaping(trunk).await.expect("live"), Some(bw_delay()));

    harness.journal.clear();
    orch.teardown().await.expect("clean teardown");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert_eq!(harness.leaked(), 0);

    let released: Vec<JournalEvent> = harness.journal.releases();
    assert_eq!(
        released,
        vec![
            JournalEvent::LinkDisconnected("s2--n3".into()),
            JournalEvent::LinkDisconnected("s2--n2".into()),
            JournalEvent::LinkDisconnected("s1--s2".into()),
            JournalEvent::LinkDisconnected("n1--s1".into()),
            JournalEvent::SwitchRemoved("s2".into()),
            JournalEvent::SwitchRemoved("s1".into()),
            JournalEvent::NodeDestroyed("n3".into()),
            JournalEvent::NodeDestroyed("n2".into()),
            JournalEvent::NodeDestroyed("n1".into()),
        ]
    );
}

#[tokio::test]
async fn addresses_are_applied_after_links() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    let events = harness.journal.events();
    let last_link = events
        .iter()
        .rposition(|e| matches!(e, JournalEvent::LinkConnected(_)))
        .expect("links");
    let first_address = events
        .iter()
        .position(|e| matches!(e, JournalEvent::AddressAssigned { .. }))
        .expect("addresses");
    assert!(last_link < first_address);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, JournalEvent::AddressAssigned { .. }))
            .count(),
        3
    );

    orch.teardown().await.expect("teardown");
}

#[tokio::test]
async fn handles_are_unavailable_after_teardown() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    let node = orch.node_handle("n1").expect("n1 live");
    let trunk_id = orch.link_between("s1", "s2").expect("declared");
    let trunk = orch.link_handle(trunk_id).expect("trunk live");
    orch.teardown().await.expect("teardown");

    let err = harness
        .backend
        .exec(&node, vec!["true".into()])
        .await
        .expect("join")
        .expect_err("node released");
    assert!(matches!(err, BackendError::EndpointUnavailable { .. }));

    let err = harness
        .fabric
        .reshape(&trunk, None)
        .await
        .expect("join")
        .expect_err("link released");
    assert!(matches!(err, FabricError::EndpointUnavailable { .. }));

    let err = orch.exec("n1", vec!["true".into()]).await.expect_err("terminated");
    assert!(matches!(err, OrchestratorError::EndpointUnavailable { .. }));
    let err = orch.reshape(trunk_id, None).await.expect_err("terminated");
    assert!(matches!(err, OrchestratorError::EndpointUnavailable { .. }));
}

#[tokio::test]
async fn teardown_twice_is_a_no_op() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    orch.teardown().await.expect("first");
    let releases = harness.journal.releases().len();
    orch.teardown().await.expect("second");

    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert_eq!(harness.journal.releases().len(), releases);
}

#[tokio::test]
async fn third_node_failure_cleans_up_everything() {
    let harness = Harness::new(FaultPlan::new().fail_create("n3"));
    let mut orch = harness.orchestrator().with_config(OrchestratorConfig::new().with_parallel_realize(false));
    for name in ["n1", "n2", "n3"] {
        orch.add_node(NodeSpec::new(name).with_interfaces(2)).expect("node");
    }
    orch.add_link("n1", "n2", None).expect("n1-n2");
    orch.add_link("n2", "n3", None).expect("n2-n3");

    let err = orch.realize().await.expect_err("n3 fails");
    assert_eq!(orch.state(), OrchestratorState::Failed);
    match &err {
        OrchestratorError::RealizationFailed {
            resource,
            cause,
            cleanup,
        } => {
            assert_eq!(resource, &ResourceRef::node("n3"));
            assert!(matches!(cause, ProvisionError::Backend(BackendError::LaunchFailed { .. })));
            assert!(cleanup.is_none());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(harness.leaked(), 0);
    assert_eq!(orch.live_handle_count(), 0);
    assert_eq!(
        harness.journal.releases(),
        vec![
            JournalEvent::NodeDestroyed("n2".into()),
            JournalEvent::NodeDestroyed("n1".into()),
        ]
    );

    // Failed is absorbing.
    orch.teardown().await.expect("no-op");
    assert_eq!(orch.state(), OrchestratorState::Failed);
    assert!(matches!(
        orch.realize().await,
        Err(OrchestratorError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn parallel_node_failure_still_records_siblings() {
    let harness = Harness::new(FaultPlan::new().fail_create("n2"));
    let mut orch = harness.orchestrator();
    for name in ["n1", "n2", "n3"] {
        orch.add_node(NodeSpec::new(name)).expect("node");
    }

    let err = orch.realize().await.expect_err("n2 fails");
    assert_eq!(err.failed_resource(), Some(&ResourceRef::node("n2")));
    assert_eq!(harness.leaked(), 0);
    assert_eq!(harness.journal.releases().len(), 2);
}

#[tokio::test]
async fn link_failure_releases_earlier_links_and_nodes() {
    let harness = Harness::new(FaultPlan::new().fail_connect("s2", "n2"));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let err = orch.realize().await.expect_err("link fails");
    assert_eq!(err.failed_resource(), Some(&ResourceRef::link("s2--n2")));
    assert_eq!(harness.leaked(), 0);

    let releases = harness.journal.releases();
    assert_eq!(releases.first(), Some(&JournalEvent::LinkDisconnected("s1--s2".into())));
    assert_eq!(releases.last(), Some(&JournalEvent::NodeDestroyed("n1".into())));
}

#[tokio::test]
async fn release_failures_are_aggregated() {
    let harness = Harness::new(FaultPlan::new().fail_destroy("n2").fail_disconnect("s1", "s2"));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    let err = orch.teardown().await.expect_err("two releases fail");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    let teardown = match err {
        OrchestratorError::Teardown(teardown) => teardown,
        other => panic!("expected teardown error, got {other}"),
    };
    let failed: Vec<&ResourceRef> = teardown.resources().collect();
    assert_eq!(failed, vec![&ResourceRef::link("s1--s2"), &ResourceRef::node("n2")]);

    // Everything else was still released.
    assert_eq!(harness.journal.releases().len(), 7);
    orch.teardown().await.expect("second teardown is a no-op");
}

#[tokio::test]
async fn parallel_teardown_keeps_kind_barriers() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness
        .orchestrator()
        .with_config(OrchestratorConfig::new().with_parallel_teardown(true));
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");
    harness.journal.clear();

    orch.teardown().await.expect("teardown");
    let kinds: Vec<u8> = harness
        .journal
        .releases()
        .iter()
        .map(|e| match e {
            JournalEvent::LinkDisconnected(_) => 0,
            JournalEvent::SwitchRemoved(_) => 1,
            _ => 2,
        })
        .collect();
    assert_eq!(kinds.len(), 9);
    assert!(kinds.windows(2).all(|w| w[0] <= w[1]), "{kinds:?}");
}

#[tokio::test]
async fn invalid_graph_stays_building() {
    let harness = Harness::new(FaultPlan::new());
    let config: TopologyConfig = serde_json::from_str(
        r#"{"nodes": [{"name": "n1"}], "links": [{"endpoints": ["n1", "ghost"]}]}"#,
    )
    .expect("config");
    let graph = crate::topology::TopologyGraph::from_config(config).expect("graph");
    let mut orch = Orchestrator::from_graph(graph, Arc::new(harness.backend.clone()), Arc::new(harness.fabric.clone()));

    let err = orch.realize().await.expect_err("dangling");
    assert!(matches!(
        err,
        OrchestratorError::Validation(ValidationError::DanglingEndpoint { .. })
    ));
    assert_eq!(orch.state(), OrchestratorState::Building);
    assert!(harness.journal.events().is_empty());

    // Declarations are still accepted.
    orch.add_switch("s9").expect("still building");
}

#[tokio::test]
async fn declarations_are_frozen_after_realize() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    orch.add_node(NodeSpec::new("n1")).expect("n1");
    orch.realize().await.expect("realize");

    let err = orch.add_node(NodeSpec::new("n2")).expect_err("live");
    assert!(matches!(
        err,
        OrchestratorError::InvalidState {
            state: OrchestratorState::Live,
            ..
        }
    ));
    orch.teardown().await.expect("teardown");
}

#[tokio::test]
async fn cancellation_tears_down_in_flight_creations() {
    let harness = Harness::new(FaultPlan::new().with_create_delay(Duration::from_millis(100)));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    let cancel = orch.cancel_handle();

    let (result, ()) = tokio::join!(orch.realize(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(OrchestratorError::Cancelled { cleanup: None })));
    assert_eq!(orch.state(), OrchestratorState::Failed);
    // The three nodes were in flight when cancelled: created, then released.
    assert_eq!(harness.journal.acquisitions().len(), 3);
    assert_eq!(harness.journal.releases().len(), 3);
    assert_eq!(harness.leaked(), 0);
}

#[tokio::test]
async fn exec_and_reshape_while_live() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    let result = orch
        .exec("n2", vec!["ip".into(), "addr".into()])
        .await
        .expect("exec");
    assert!(result.is_success());

    let edge = orch.link_between("n2", "s2").expect("declared");
    let policy = ShapingPolicy::new().with_loss(0.1);
    orch.reshape(edge, Some(policy.clone())).await.expect("reshape");
    assert_eq!(orch.link_shaping(edge).await.expect("live"), Some(policy));

    let err = orch.exec("nope", vec![]).await.expect_err("unknown");
    assert!(matches!(err, OrchestratorError::UnknownNode { .. }));

    let report = orch.report();
    assert_eq!(report.nodes.len(), 3);
    assert_eq!(report.switches.len(), 2);
    assert_eq!(report.links.len(), 4);
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["state"], "live");

    orch.teardown().await.expect("teardown");
    assert!(orch.report().nodes.is_empty());
}

#[tokio::test]
async fn ping_all_reaches_every_addressed_pair() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.realize().await.expect("realize");

    let report = orch.ping_all().await.expect("ping");
    assert_eq!(report.sent(), 6);
    assert_eq!(report.dropped_percent(), 0.0);

    orch.teardown().await.expect("teardown");
    assert!(matches!(
        orch.ping_all().await,
        Err(OrchestratorError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn with_live_tears_down_after_body() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let handles = orch
        .with_live(async |live: &Orchestrator| live.live_handle_count())
        .await
        .expect("scoped run");

    assert_eq!(handles, 9);
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert_eq!(harness.leaked(), 0);
}

#[tokio::test]
async fn dropping_a_live_orchestrator_releases_resources() {
    let harness = Harness::new(FaultPlan::new());
    {
        let mut orch = harness.orchestrator();
        declare_reference(&mut orch);
        orch.realize().await.expect("realize");
    }

    wait_until_released(&harness).await;
    assert_eq!(harness.leaked(), 0);
}

#[tokio::test]
async fn empty_topology_realizes_and_terminates() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    orch.realize().await.expect("empty graph is valid");
    assert_eq!(orch.live_handle_count(), 0);
    orch.teardown().await.expect("teardown");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
}

#[tokio::test]
async fn teardown_before_realize_terminates() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);
    orch.teardown().await.expect("nothing to release");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert!(harness.journal.events().is_empty());
}

#[tokio::test]
async fn health_checks_report_simulated_components() {
    let harness = Harness::new(FaultPlan::new());
    let orch = harness.orchestrator();
    let backend = orch.backend().health_check().await.expect("join");
    let fabric = orch.fabric().health_check().await.expect("join");
    assert!(backend.is_healthy);
    assert!(fabric.is_healthy);
}

async fn wait_until_released(harness: &Harness) {
    for _ in 0..50 {
        if harness.leaked() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn dropped_realize_releases_in_flight_creations() {
    let harness = Harness::new(FaultPlan::new().with_create_delay(Duration::from_millis(100)));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let outcome = tokio::time::timeout(Duration::from_millis(20), orch.realize()).await;
    assert!(outcome.is_err(), "realize should still be creating nodes");
    assert_eq!(orch.state(), OrchestratorState::Realizing);
    drop(orch);

    wait_until_released(&harness).await;
    assert_eq!(harness.leaked(), 0);
    assert_eq!(harness.journal.acquisitions().len(), 3);
    assert_eq!(harness.journal.releases().len(), 3);
}

#[tokio::test]
async fn teardown_after_dropped_realize_releases_in_flight_creations() {
    let harness = Harness::new(FaultPlan::new().with_create_delay(Duration::from_millis(100)));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let outcome = tokio::time::timeout(Duration::from_millis(20), orch.realize()).await;
    assert!(outcome.is_err());

    orch.teardown().await.expect("teardown");
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert_eq!(harness.leaked(), 0);
    assert_eq!(harness.journal.releases().len(), 3);
}

#[tokio::test]
async fn missing_image_fails_before_any_node_is_created() {
    let images = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(images.path().join("platform").join("latest")).expect("mkdir");

    let harness = Harness::new(FaultPlan::new());
    let backend = harness
        .backend
        .clone()
        .with_images(Arc::new(DirectoryImages::new(images.path())));
    let mut orch = Orchestrator::new(Arc::new(backend), Arc::new(harness.fabric.clone()));
    orch.add_node(NodeSpec::new("n1").with_image("platform:latest")).expect("n1");
    orch.add_node(NodeSpec::new("n2").with_image("platform")).expect("n2");
    orch.add_node(NodeSpec::new("n3").with_image("absent:latest")).expect("n3");

    let err = orch.realize().await.expect_err("n3 image is missing");
    match &err {
        OrchestratorError::RealizationFailed { resource, cause, .. } => {
            assert_eq!(resource, &ResourceRef::node("n3"));
            assert!(matches!(
                cause,
                ProvisionError::Backend(BackendError::ImageUnavailable { .. })
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orch.state(), OrchestratorState::Failed);
    assert!(harness.journal.events().is_empty());
}

#[tokio::test]
async fn with_live_tears_down_when_body_fails() {
    let harness = Harness::new(FaultPlan::new());
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let outcome = orch
        .with_live(async |live: &Orchestrator| {
            if live.live_handle_count() == 9 {
                Err::<(), String>("connectivity check failed".to_string())
            } else {
                Ok(())
            }
        })
        .await
        .expect("realize and teardown succeed");

    assert_eq!(outcome, Err("connectivity check failed".to_string()));
    assert_eq!(orch.state(), OrchestratorState::Terminated);
    assert_eq!(harness.leaked(), 0);
}

#[tokio::test]
async fn with_live_skips_body_when_realize_fails() {
    let harness = Harness::new(FaultPlan::new().fail_create("n3"));
    let mut orch = harness.orchestrator();
    declare_reference(&mut orch);

    let ran = AtomicBool::new(false);
    let err = orch
        .with_live(async |_: &Orchestrator| ran.store(true, Ordering::SeqCst))
        .await
        .expect_err("n3 fails");

    assert_eq!(err.failed_resource(), Some(&ResourceRef::node("n3")));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(orch.state(), OrchestratorState::Failed);
    assert_eq!(harness.leaked(), 0);
}

// ============================================================================
// File: src/topology/tests.rs
// ----------------------------------------------------------------------------
// Test suite for topology declaration and validation
// ============================================================================

use std::time::Duration;

use super::*;

fn addr(s: &str) -> NodeAddress {
    s.parse().expect("test address should parse")
}

fn reference_graph() -> TopologyGraph {
    let mut graph = TopologyGraph::new();
    for (name, ip) in [("n1", "10.0.0.1"), ("n2", "10.0.0.2"), ("n3", "10.0.0.3")] {
        graph
            .add_node(NodeSpec::new(name).with_address(addr(ip)))
            .expect("add node");
    }
    graph.add_switch("s1").expect("add s1");
    graph.add_switch("s2").expect("add s2");
    graph.add_link("n1", "s1", None).expect("n1-s1");
    graph
        .add_link(
            "s1",
            "s2",
            Some(
                ShapingPolicy::new()
                    .with_bandwidth_mbit(1.0)
                    .with_delay(Duration::from_millis(100)),
            ),
        )
        .expect("s1-s2");
    graph.add_link("s2", "n2", None).expect("s2-n2");
    graph.add_link("s2", "n3", None).expect("s2-n3");
    graph
}

#[test]
fn reference_topology_validates() {
    let graph = reference_graph();
    assert!(graph.validate().is_ok());
    assert_eq!(graph.nodes().len(), 3);
    assert_eq!(graph.switches().len(), 2);
    assert_eq!(graph.links().len(), 4);
    assert_eq!(graph.find_link("s2", "s1"), Some(LinkId(1)));
    assert_eq!(graph.kind_of("s1"), Some(EndpointKind::Switch));
    assert_eq!(graph.kind_of("n1"), Some(EndpointKind::Node));
}

#[test]
fn ids_follow_declaration_order() {
    let mut graph = TopologyGraph::new();
    assert_eq!(graph.add_node(NodeSpec::new("a")), Ok(NodeId(0)));
    assert_eq!(graph.add_node(NodeSpec::new("b")), Ok(NodeId(1)));
    assert_eq!(graph.add_switch("s"), Ok(SwitchId(0)));
    assert_eq!(graph.add_link("a", "s", None), Ok(LinkId(0)));
}

#[test]
fn names_are_shared_between_nodes_and_switches() {
    let mut graph = TopologyGraph::new();
    graph.add_node(NodeSpec::new("x")).expect("add node");

    assert_eq!(
        graph.add_switch("x"),
        Err(ValidationError::DuplicateIdentity { name: "x".into() })
    );
    assert_eq!(
        graph.add_node(NodeSpec::new("x")),
        Err(ValidationError::DuplicateIdentity { name: "x".into() })
    );
}

#[test]
fn duplicate_addresses_are_rejected() {
    let mut graph = TopologyGraph::new();
    graph
        .add_node(NodeSpec::new("a").with_address(addr("10.0.0.1")))
        .expect("add a");

    let err = graph
        .add_node(NodeSpec::new("b").with_address(addr("10.0.0.1/24")))
        .expect_err("same ip, different prefix");
    assert!(matches!(err, ValidationError::DuplicateAddress { ref owner, .. } if owner == "a"));
}

#[test]
fn link_to_undeclared_endpoint_is_unknown() {
    let mut graph = TopologyGraph::new();
    graph.add_node(NodeSpec::new("a")).expect("add a");

    let err = graph.add_link("a", "ghost", None).expect_err("ghost endpoint");
    assert_eq!(
        err,
        ValidationError::UnknownEndpoint {
            endpoint: "ghost".into(),
            link: "a--ghost".into()
        }
    );
    assert!(graph.links().is_empty());
}

#[test]
fn self_loops_and_bad_shaping_are_rejected_at_declaration() {
    let mut graph = TopologyGraph::new();
    graph.add_switch("s").expect("add s");
    graph.add_switch("t").expect("add t");

    assert!(matches!(
        graph.add_link("s", "s", None),
        Err(ValidationError::SelfLoop { .. })
    ));
    assert!(matches!(
        graph.add_link("s", "t", Some(ShapingPolicy::new().with_loss(2.0))),
        Err(ValidationError::InvalidShaping { .. })
    ));
}

#[test]
fn invalid_names_are_rejected() {
    let mut graph = TopologyGraph::new();
    assert!(matches!(
        graph.add_node(NodeSpec::new("")),
        Err(ValidationError::InvalidName { .. })
    ));
    assert!(matches!(
        graph.add_switch("has space"),
        Err(ValidationError::InvalidName { .. })
    ));
}

#[test]
fn dangling_endpoint_from_config_fails_validation() {
    let config = TopologyConfig {
        nodes: vec![NodeSpec::new("n1")],
        switches: vec![SwitchSpec::new("s1")],
        links: vec![LinkSpec::new("n1", "s1"), LinkSpec::new("s1", "s9")],
    };
    let graph = TopologyGraph::from_config(config).expect("nodes and switches are fine");

    assert_eq!(
        graph.validate(),
        Err(ValidationError::DanglingEndpoint {
            endpoint: "s9".into(),
            link: "s1--s9".into()
        })
    );
}

#[test]
fn interface_capacity_is_enforced() {
    let mut graph = TopologyGraph::new();
    graph.add_node(NodeSpec::new("n1")).expect("add n1");
    graph.add_switch("s1").expect("add s1");
    graph.add_switch("s2").expect("add s2");
    graph.add_link("n1", "s1", None).expect("first link");
    graph.add_link("n1", "s2", None).expect("declaration itself succeeds");

    assert_eq!(
        graph.validate(),
        Err(ValidationError::CapacityExceeded {
            node: "n1".into(),
            interfaces: 1,
            links: 2
        })
    );
}

#[test]
fn multi_homed_node_within_capacity_validates() {
    let mut graph = TopologyGraph::new();
    graph
        .add_node(NodeSpec::new("router").with_interfaces(2))
        .expect("add router");
    graph.add_switch("s1").expect("add s1");
    graph.add_switch("s2").expect("add s2");
    graph.add_link("router", "s1", None).expect("link 1");
    graph.add_link("router", "s2", None).expect("link 2");

    assert!(graph.validate().is_ok());
}

#[test]
fn disconnected_graph_is_legal() {
    let mut graph = TopologyGraph::new();
    graph.add_node(NodeSpec::new("a")).expect("add a");
    graph.add_node(NodeSpec::new("b")).expect("add b");
    graph.add_switch("s1").expect("add s1");
    graph.add_link("a", "s1", None).expect("a-s1");

    assert!(graph.validate().is_ok());
}

#[test]
fn validate_is_repeatable() {
    let graph = reference_graph();
    for _ in 0..3 {
        assert!(graph.validate().is_ok());
    }
}

#[test]
fn config_round_trip_preserves_declarations() {
    let graph = reference_graph();
    let rebuilt = TopologyGraph::from_config(graph.to_config()).expect("rebuild");
    assert!(rebuilt.validate().is_ok());
    assert_eq!(rebuilt.links(), graph.links());
    assert_eq!(rebuilt.nodes(), graph.nodes());
}

// ============================================================================
// File: src/orchestrator/plan.rs
// ----------------------------------------------------------------------------
// Realization plan: the validated graph laid out as ordered creation steps.
// ============================================================================

use std::collections::HashMap;

use crate::topology::{EndpointKind, LinkId, NodeAddress, NodeSpec, ShapingPolicy, TopologyGraph};

/// One end of a planned link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlannedEnd {
    /// A node's `interface`-th interface
    Node { name: String, interface: usize },
    Switch { name: String },
}

impl PlannedEnd {
    pub(crate) fn name(&self) -> &str {
        match self {
            PlannedEnd::Node { name, .. } | PlannedEnd::Switch { name } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedLink {
    pub id: LinkId,
    pub label: String,
    pub ends: [PlannedEnd; 2],
    pub shaping: Option<ShapingPolicy>,
}

/// Creation steps for a validated graph.
#[derive(Debug, Clone)]
pub(crate) struct RealizationPlan {
    pub nodes: Vec<NodeSpec>,
    pub switches: Vec<String>,
    /// Links grouped so that no two links in a wave share an endpoint;
    /// links sharing an endpoint keep their declaration order.
    pub waves: Vec<Vec<PlannedLink>>,
    /// Addresses to apply once links exist, in node declaration order
    pub addresses: Vec<(String, NodeAddress)>,
}

impl RealizationPlan {
    /// Lay out `graph`, which must already be valid.
    pub(crate) fn build(graph: &TopologyGraph) -> Self {
        let mut next_interface: HashMap<&str, usize> = HashMap::new();
        let mut next_wave: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<PlannedLink>> = Vec::new();

        for (index, spec) in graph.links().iter().enumerate() {
            let ends = spec.endpoints.each_ref().map(|name| match graph.kind_of(name) {
                Some(EndpointKind::Node) => {
                    let slot = next_interface.entry(name.as_str()).or_insert(0);
                    let interface = *slot;
                    *slot += 1;
                    PlannedEnd::Node {
                        name: name.clone(),
                        interface,
                    }
                }
                _ => PlannedEnd::Switch { name: name.clone() },
            });

            let [a, b] = &spec.endpoints;
            let wave = next_wave
                .get(a.as_str())
                .copied()
                .unwrap_or(0)
                .max(next_wave.get(b.as_str()).copied().unwrap_or(0));
            next_wave.insert(a.as_str(), wave + 1);
            next_wave.insert(b.as_str(), wave + 1);

            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(PlannedLink {
                id: LinkId(index),
                label: spec.label(),
                ends,
                shaping: spec.shaping.clone(),
            });
        }

        let addresses = graph
            .nodes()
            .iter()
            .filter_map(|node| node.address.map(|address| (node.name.clone(), address)))
            .collect();

        Self {
            nodes: graph.nodes().to_vec(),
            switches: graph.switches().iter().map(|s| s.name.clone()).collect(),
            waves,
            addresses,
        }
    }

    /// True if `node` is an end of any planned link.
    pub(crate) fn is_linked(&self, node: &str) -> bool {
        self.waves
            .iter()
            .flatten()
            .any(|link| link.ends.iter().any(|end| end.name() == node))
    }

    pub(crate) fn link_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{LinkSpec, TopologyConfig};

    fn graph(config: &str) -> TopologyGraph {
        let config: TopologyConfig = serde_json::from_str(config).expect("config");
        TopologyGraph::from_config(config).expect("graph")
    }

    #[test]
    fn chain_through_switches_is_sequential() {
        let graph = graph(
            r#"{
                "nodes": [{"name": "n1"}, {"name": "n2"}, {"name": "n3"}],
                "switches": [{"name": "s1"}, {"name": "s2"}],
                "links": [
                    {"endpoints": ["n1", "s1"]},
                    {"endpoints": ["s1", "s2"]},
                    {"endpoints": ["s2", "n2"]},
                    {"endpoints": ["s2", "n3"]}
                ]
            }"#,
        );
        let plan = RealizationPlan::build(&graph);

        let labels: Vec<Vec<&str>> = plan
            .waves
            .iter()
            .map(|wave| wave.iter().map(|l| l.label.as_str()).collect())
            .collect();
        assert_eq!(labels, vec![vec!["n1--s1"], vec!["s1--s2"], vec!["s2--n2"], vec!["s2--n3"]]);
        assert_eq!(plan.link_count(), 4);
    }

    #[test]
    fn independent_links_share_a_wave() {
        let mut graph = TopologyGraph::new();
        for name in ["a", "b", "c", "d"] {
            graph.add_node(NodeSpec::new(name).with_interfaces(2)).expect("node");
        }
        graph.add_link("a", "b", None).expect("a-b");
        graph.add_link("c", "d", None).expect("c-d");
        graph.add_link("b", "c", None).expect("b-c");

        let plan = RealizationPlan::build(&graph);
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0].len(), 2);
        assert_eq!(plan.waves[1][0].label, "b--c");
    }

    #[test]
    fn interfaces_are_numbered_per_node() {
        let mut graph = TopologyGraph::new();
        graph.add_node(NodeSpec::new("r").with_interfaces(2)).expect("r");
        graph.add_node(NodeSpec::new("h")).expect("h");
        graph.add_switch("s").expect("s");
        graph.add_link_spec(LinkSpec::new("r", "s")).expect("r-s");
        graph.add_link_spec(LinkSpec::new("h", "r")).expect("h-r");

        let plan = RealizationPlan::build(&graph);
        let second = &plan.waves[1][0];
        assert_eq!(
            second.ends,
            [
                PlannedEnd::Node {
                    name: "h".into(),
                    interface: 0
                },
                PlannedEnd::Node {
                    name: "r".into(),
                    interface: 1
                },
            ]
        );
        assert!(plan.is_linked("h"));
    }

    #[test]
    fn addresses_follow_node_order() {
        let mut graph = TopologyGraph::new();
        graph
            .add_node(NodeSpec::new("n2").with_address("10.0.0.2".parse().expect("addr")))
            .expect("n2");
        graph.add_node(NodeSpec::new("n1")).expect("n1");
        graph
            .add_node(NodeSpec::new("n3").with_address("10.0.0.3".parse().expect("addr")))
            .expect("n3");

        let plan = RealizationPlan::build(&graph);
        let names: Vec<&str> = plan.addresses.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["n2", "n3"]);
        assert!(plan.waves.is_empty());
    }
}

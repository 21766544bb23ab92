// ============================================================================
// File: src/topology/mod.rs
// ----------------------------------------------------------------------------
// In-memory topology graph: declared nodes, switches and links.
//
// The graph is purely descriptive. It never touches the host; the
// orchestrator copies it into a realization plan when `realize()` runs.
// ============================================================================

use std::collections::HashMap;

mod config;
mod errors;
mod shaping;
mod types;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, TopologyConfig};
pub use errors::{ValidationError, ValidationResult};
pub use shaping::ShapingPolicy;
pub use types::{EndpointKind, LinkId, LinkSpec, NodeAddress, NodeId, NodeSpec, SwitchId, SwitchSpec};

/// Declared topology.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: Vec<NodeSpec>,
    switches: Vec<SwitchSpec>,
    links: Vec<LinkSpec>,

    /// Identity index shared by nodes and switches
    names: HashMap<String, EndpointKind>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a declaration file.
    ///
    /// Nodes and switches are checked as they are added. Links are recorded
    /// verbatim so that [`validate`](Self::validate) reports dangling endpoints
    /// and capacity problems for the file as a whole.
    pub fn from_config(config: TopologyConfig) -> ValidationResult<Self> {
        let mut graph = Self::new();
        for node in config.nodes {
            graph.add_node(node)?;
        }
        for switch in config.switches {
            graph.add_switch(switch.name)?;
        }
        graph.links = config.links;
        Ok(graph)
    }

    /// Export the declarations back into file form.
    pub fn to_config(&self) -> TopologyConfig {
        TopologyConfig {
            nodes: self.nodes.clone(),
            switches: self.switches.clone(),
            links: self.links.clone(),
        }
    }

    /// Declare a node.
    pub fn add_node(&mut self, spec: NodeSpec) -> ValidationResult<NodeId> {
        check_name(&spec.name)?;
        if self.names.contains_key(&spec.name) {
            return Err(ValidationError::DuplicateIdentity { name: spec.name });
        }
        if let Some(address) = spec.address
            && let Some(owner) = self.nodes.iter().find(|n| n.address.map(|a| a.ip) == Some(address.ip))
        {
            return Err(ValidationError::DuplicateAddress {
                name: spec.name,
                address: address.to_string(),
                owner: owner.name.clone(),
            });
        }

        self.names.insert(spec.name.clone(), EndpointKind::Node);
        self.nodes.push(spec);
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Declare a switch.
    pub fn add_switch<N: Into<String>>(&mut self, name: N) -> ValidationResult<SwitchId> {
        let name = name.into();
        check_name(&name)?;
        if self.names.contains_key(&name) {
            return Err(ValidationError::DuplicateIdentity { name });
        }

        self.names.insert(name.clone(), EndpointKind::Switch);
        self.switches.push(SwitchSpec::new(name));
        Ok(SwitchId(self.switches.len() - 1))
    }

    /// Declare a link between two already-declared endpoints.
    pub fn add_link<A: Into<String>, B: Into<String>>(
        &mut self,
        a: A,
        b: B,
        shaping: Option<ShapingPolicy>,
    ) -> ValidationResult<LinkId> {
        let mut spec = LinkSpec::new(a, b);
        spec.shaping = shaping;
        self.add_link_spec(spec)
    }

    pub fn add_link_spec(&mut self, spec: LinkSpec) -> ValidationResult<LinkId> {
        for endpoint in &spec.endpoints {
            if !self.names.contains_key(endpoint) {
                return Err(ValidationError::UnknownEndpoint {
                    endpoint: endpoint.clone(),
                    link: spec.label(),
                });
            }
        }
        check_link_shape(&spec)?;

        self.links.push(spec);
        Ok(LinkId(self.links.len() - 1))
    }

    /// Check the whole graph.
    ///
    /// A graph split into several partitions is legal.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut addresses: HashMap<_, &str> = HashMap::new();
        for node in &self.nodes {
            if let Some(address) = node.address
                && let Some(owner) = addresses.insert(address.ip, node.name.as_str())
            {
                return Err(ValidationError::DuplicateAddress {
                    name: node.name.clone(),
                    address: address.to_string(),
                    owner: owner.to_string(),
                });
            }
        }

        let mut degree: HashMap<&str, usize> = HashMap::new();
        for link in &self.links {
            for endpoint in &link.endpoints {
                if !self.names.contains_key(endpoint) {
                    return Err(ValidationError::DanglingEndpoint {
                        endpoint: endpoint.clone(),
                        link: link.label(),
                    });
                }
                *degree.entry(endpoint.as_str()).or_default() += 1;
            }
            check_link_shape(link)?;
        }

        for node in &self.nodes {
            let links = degree.get(node.name.as_str()).copied().unwrap_or(0);
            if links > usize::from(node.interfaces) {
                return Err(ValidationError::CapacityExceeded {
                    node: node.name.clone(),
                    interfaces: node.interfaces,
                    links,
                });
            }
        }

        Ok(())
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn switches(&self) -> &[SwitchSpec] {
        &self.switches
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn link(&self, id: LinkId) -> Option<&LinkSpec> {
        self.links.get(id.0)
    }

    pub fn kind_of(&self, name: &str) -> Option<EndpointKind> {
        self.names.get(name).copied()
    }

    /// First declared link joining `a` and `b`, in either direction.
    pub fn find_link(&self, a: &str, b: &str) -> Option<LinkId> {
        self.links
            .iter()
            .position(|l| {
                (l.endpoints[0] == a && l.endpoints[1] == b)
                    || (l.endpoints[0] == b && l.endpoints[1] == a)
            })
            .map(LinkId)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.switches.is_empty()
    }
}

fn check_name(name: &str) -> ValidationResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.chars().any(|c| c.is_whitespace() || c == '/') {
        Some("name contains whitespace or '/'")
    } else if name.len() > 64 {
        Some("name is longer than 64 characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ValidationError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_link_shape(link: &LinkSpec) -> ValidationResult<()> {
    if link.endpoints[0] == link.endpoints[1] {
        return Err(ValidationError::SelfLoop {
            endpoint: link.endpoints[0].clone(),
            link: link.label(),
        });
    }
    if let Some(shaping) = &link.shaping {
        shaping.validate()?;
    }
    Ok(())
}

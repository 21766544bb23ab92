// ============================================================================
// File: src/orchestrator/session.rs
// ----------------------------------------------------------------------------
// Interaction with a live topology: exec, reshape, shaping queries,
// connectivity checks and status reports.
// ============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use super::errors::ResourceRef;
use super::{LiveResource, Orchestrator, OrchestratorError, OrchestratorResult, OrchestratorState};
use crate::async_task::join_or;
use crate::backends::{BackendError, ExecResult, NodeHandle};
use crate::fabric::{FabricError, LinkEnd, LinkHandle, SwitchHandle};
use crate::topology::{LinkId, NodeAddress, ShapingPolicy};

/// Outcome of one ping in [`Orchestrator::ping_all`].
#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub from: String,
    pub to: String,
    pub address: NodeAddress,
    pub reachable: bool,
}

/// All-pairs reachability between addressed nodes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PingReport {
    pub results: Vec<PingResult>,
}

impl PingReport {
    pub fn sent(&self) -> usize {
        self.results.len()
    }

    pub fn received(&self) -> usize {
        self.results.iter().filter(|r| r.reachable).count()
    }

    /// Percentage of pings that got no reply.
    pub fn dropped_percent(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let lost = self.sent() - self.received();
        lost as f64 * 100.0 / self.sent() as f64
    }
}

impl fmt::Display for PingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            let mark = if result.reachable { "ok" } else { "X" };
            writeln!(f, "{} -> {} ({}): {}", result.from, result.to, result.address.ip, mark)?;
        }
        write!(
            f,
            "Results: {:.0}% dropped ({}/{} received)",
            self.dropped_percent(),
            self.received(),
            self.sent()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub namespace: String,
    pub address: Option<NodeAddress>,
    pub command: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchReport {
    pub name: String,
    pub device: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndReport {
    pub endpoint: String,
    pub namespace: Option<String>,
    pub device: String,
}

impl From<&LinkEnd> for EndReport {
    fn from(end: &LinkEnd) -> Self {
        Self {
            endpoint: end.endpoint.clone(),
            namespace: end.namespace.clone(),
            device: end.device.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub id: usize,
    pub label: String,
    pub ends: Vec<EndReport>,
    pub shaping: Option<ShapingPolicy>,
    pub created_at: DateTime<Utc>,
}

/// Serializable snapshot of an orchestrator and its live resources.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub state: OrchestratorState,
    pub backend: String,
    pub fabric: String,
    pub generated_at: DateTime<Utc>,
    pub realized_at: Option<DateTime<Utc>>,
    pub nodes: Vec<NodeReport>,
    pub switches: Vec<SwitchReport>,
    pub links: Vec<LinkReport>,
}

impl Orchestrator {
    /// Run `command` inside `node`.
    pub async fn exec(&self, node: &str, command: Vec<String>) -> OrchestratorResult<ExecResult> {
        let handle = self.live_node(node, "exec")?;
        let task = self.backend.exec(&handle, command);
        join_or(task, |message| BackendError::Internal { message })
            .await
            .map_err(|e| match e {
                BackendError::EndpointUnavailable { node } => OrchestratorError::EndpointUnavailable {
                    resource: ResourceRef::node(node),
                },
                other => other.into(),
            })
    }

    /// Replace the shaping of a live link; `None` clears it.
    pub async fn reshape(&self, link: LinkId, shaping: Option<ShapingPolicy>) -> OrchestratorResult<()> {
        let handle = self.live_link(link, "reshape")?;
        let task = self.fabric.reshape(&handle, shaping);
        join_or(task, |message| FabricError::Internal { message })
            .await
            .map_err(|e| match e {
                FabricError::EndpointUnavailable { endpoint } => OrchestratorError::EndpointUnavailable {
                    resource: ResourceRef::link(endpoint),
                },
                other => other.into(),
            })?;
        info!("link {} reshaped", handle.label());
        Ok(())
    }

    /// Shaping currently installed on a live link.
    pub async fn link_shaping(&self, link: LinkId) -> OrchestratorResult<Option<ShapingPolicy>> {
        let handle = self.live_link(link, "query shaping")?;
        if !handle.token().is_live().await {
            return Err(OrchestratorError::EndpointUnavailable {
                resource: ResourceRef::link(handle.label()),
            });
        }
        Ok(handle.shaping())
    }

    /// Id of the link declared between `a` and `b`, in either direction.
    pub fn link_between(&self, a: &str, b: &str) -> Option<LinkId> {
        self.graph.find_link(a, b)
    }

    pub fn node_handle(&self, name: &str) -> Option<NodeHandle> {
        self.ledger.iter().find_map(|resource| match resource {
            LiveResource::Node(handle) if handle.name() == name => Some(handle.clone()),
            _ => None,
        })
    }

    pub fn switch_handle(&self, name: &str) -> Option<SwitchHandle> {
        self.ledger.iter().find_map(|resource| match resource {
            LiveResource::Switch(handle) if handle.name() == name => Some(handle.clone()),
            _ => None,
        })
    }

    pub fn link_handle(&self, link: LinkId) -> Option<LinkHandle> {
        self.ledger.iter().find_map(|resource| match resource {
            LiveResource::Link { id, handle } if *id == link => Some(handle.clone()),
            _ => None,
        })
    }

    /// Ping every addressed node from every other addressed node.
    pub async fn ping_all(&self) -> OrchestratorResult<PingReport> {
        self.ensure_live("ping")?;
        let timeout = self.config.ping_timeout.as_secs().max(1).to_string();

        let targets: Vec<(String, NodeAddress)> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|node| node.address.map(|address| (node.name.clone(), address)))
            .collect();

        let mut pings = Vec::new();
        for (from, _) in &targets {
            let handle = self.live_node(from, "ping")?;
            for (to, address) in targets.iter().filter(|(to, _)| to != from) {
                let command = vec![
                    "ping".to_string(),
                    "-c".to_string(),
                    "1".to_string(),
                    "-W".to_string(),
                    timeout.clone(),
                    address.ip.to_string(),
                ];
                let task = self.backend.exec(&handle, command);
                pings.push((from.clone(), to.clone(), *address, task));
            }
        }

        let mut report = PingReport::default();
        for (from, to, address, task) in pings {
            let result = join_or(task, |message| BackendError::Internal { message }).await?;
            debug!("ping {} -> {}: exit {}", from, to, result.exit_code);
            report.results.push(PingResult {
                from,
                to,
                address,
                reachable: result.is_success(),
            });
        }
        info!("ping_all: {:.0}% dropped", report.dropped_percent());
        Ok(report)
    }

    /// Snapshot of the current state and every live resource.
    pub fn report(&self) -> TopologyReport {
        let mut nodes = Vec::new();
        let mut switches = Vec::new();
        let mut links = Vec::new();

        for resource in &self.ledger {
            match resource {
                LiveResource::Node(handle) => {
                    let spec = self.graph.node(handle.name());
                    nodes.push(NodeReport {
                        name: handle.name().to_string(),
                        namespace: handle.namespace().to_string(),
                        address: spec.and_then(|s| s.address),
                        command: spec.and_then(|s| s.command.clone()),
                        image: spec.and_then(|s| s.image.clone()),
                        created_at: handle.created_at(),
                    });
                }
                LiveResource::Switch(handle) => switches.push(SwitchReport {
                    name: handle.name().to_string(),
                    device: handle.device().to_string(),
                    created_at: handle.created_at(),
                }),
                LiveResource::Link { id, handle } => links.push(LinkReport {
                    id: id.0,
                    label: handle.label().to_string(),
                    ends: handle.ends().iter().map(EndReport::from).collect(),
                    shaping: handle.shaping(),
                    created_at: handle.created_at(),
                }),
            }
        }

        TopologyReport {
            state: self.state,
            backend: self.backend.backend_type().to_string(),
            fabric: self.fabric.fabric_type().to_string(),
            generated_at: Utc::now(),
            realized_at: self.realized_at,
            nodes,
            switches,
            links,
        }
    }

    fn ensure_live(&self, operation: &'static str) -> OrchestratorResult<()> {
        if self.state == OrchestratorState::Live {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Live handle for `name`, distinguishing unknown, released and
    /// not-yet-live nodes.
    fn live_node(&self, name: &str, operation: &'static str) -> OrchestratorResult<NodeHandle> {
        if self.graph.node(name).is_none() {
            return Err(OrchestratorError::UnknownNode { name: name.to_string() });
        }
        if self.state.is_final() {
            return Err(OrchestratorError::EndpointUnavailable {
                resource: ResourceRef::node(name),
            });
        }
        self.ensure_live(operation)?;
        self.node_handle(name).ok_or_else(|| OrchestratorError::EndpointUnavailable {
            resource: ResourceRef::node(name),
        })
    }

    fn live_link(&self, link: LinkId, operation: &'static str) -> OrchestratorResult<LinkHandle> {
        let Some(spec) = self.graph.link(link) else {
            return Err(OrchestratorError::UnknownLink { link: link.to_string() });
        };
        if self.state.is_final() {
            return Err(OrchestratorError::EndpointUnavailable {
                resource: ResourceRef::link(spec.label()),
            });
        }
        self.ensure_live(operation)?;
        self.link_handle(link).ok_or_else(|| OrchestratorError::EndpointUnavailable {
            resource: ResourceRef::link(spec.label()),
        })
    }
}

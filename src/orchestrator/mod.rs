// ============================================================================
// File: src/orchestrator/mod.rs
// ----------------------------------------------------------------------------
// Orchestrator: realizes a topology graph through an isolation backend and a
// link fabric, owns every live handle, and guarantees reverse-order teardown.
//
// Provides:
// - Declaration delegates while Building
// - realize() / teardown() state machine (lifecycle.rs)
// - exec, reshape, connectivity checks and status reports while Live
//   (session.rs)
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, warn};

use crate::backends::{IsolationBackend, NodeHandle};
use crate::fabric::{LinkFabric, LinkHandle, SwitchHandle};
use crate::topology::{LinkId, NodeId, NodeSpec, ShapingPolicy, SwitchId, TopologyGraph};

mod errors;
mod lifecycle;
mod plan;
mod session;
mod state;

#[cfg(test)]
mod tests;

pub use errors::{
    OrchestratorError, OrchestratorResult, ProvisionError, ReleaseFailure, ResourceKind, ResourceRef, TeardownError,
};
pub use session::{EndReport, LinkReport, NodeReport, PingReport, PingResult, SwitchReport, TopologyReport};
pub use state::OrchestratorState;

/// Orchestrator behaviour knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Create independent nodes, switches and links concurrently
    pub parallel_realize: bool,

    /// Release resources of one kind concurrently (kinds stay ordered)
    pub parallel_teardown: bool,

    /// Per-ping timeout for `ping_all`
    pub ping_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            parallel_realize: true,
            parallel_teardown: false,
            ping_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_parallel_realize(mut self, parallel: bool) -> Self {
        self.parallel_realize = parallel;
        self
    }

    pub fn with_parallel_teardown(mut self, parallel: bool) -> Self {
        self.parallel_teardown = parallel;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests cancellation of an in-progress `realize()`.
///
/// Creations already in flight finish and are torn down with everything
/// else; `realize()` then returns `Cancelled`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A live resource owned by the orchestrator.
#[derive(Debug, Clone)]
pub(crate) enum LiveResource {
    Node(NodeHandle),
    Switch(SwitchHandle),
    Link { id: LinkId, handle: LinkHandle },
}

impl LiveResource {
    pub(crate) fn kind(&self) -> ResourceKind {
        match self {
            LiveResource::Node(_) => ResourceKind::Node,
            LiveResource::Switch(_) => ResourceKind::Switch,
            LiveResource::Link { .. } => ResourceKind::Link,
        }
    }

    pub(crate) fn resource_ref(&self) -> ResourceRef {
        match self {
            LiveResource::Node(handle) => ResourceRef::node(handle.name()),
            LiveResource::Switch(handle) => ResourceRef::switch(handle.name()),
            LiveResource::Link { handle, .. } => ResourceRef::link(handle.label()),
        }
    }
}

/// Owns a topology and every resource realized from it.
///
/// There is no global state: each orchestrator is an independent instance,
/// and two orchestrators on one host do not share names or devices.
#[derive(Debug)]
pub struct Orchestrator {
    graph: TopologyGraph,
    backend: Arc<dyn IsolationBackend>,
    fabric: Arc<dyn LinkFabric>,
    config: OrchestratorConfig,
    state: OrchestratorState,
    /// Live handles in creation order
    ledger: Vec<LiveResource>,
    /// Creations abandoned by a dropped `realize()`
    orphans: lifecycle::Orphans,
    cancel: Arc<AtomicBool>,
    realized_at: Option<DateTime<Utc>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn IsolationBackend>, fabric: Arc<dyn LinkFabric>) -> Self {
        Self::from_graph(TopologyGraph::new(), backend, fabric)
    }

    /// Start from an already declared graph, e.g. one loaded from a file.
    pub fn from_graph(graph: TopologyGraph, backend: Arc<dyn IsolationBackend>, fabric: Arc<dyn LinkFabric>) -> Self {
        Self {
            graph,
            backend,
            fabric,
            config: OrchestratorConfig::default(),
            state: OrchestratorState::Building,
            ledger: Vec::new(),
            orphans: lifecycle::Orphans::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            realized_at: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn IsolationBackend> {
        &self.backend
    }

    pub fn fabric(&self) -> &Arc<dyn LinkFabric> {
        &self.fabric
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> OrchestratorResult<NodeId> {
        self.ensure_building("add a node")?;
        Ok(self.graph.add_node(spec)?)
    }

    pub fn add_switch<N: Into<String>>(&mut self, name: N) -> OrchestratorResult<SwitchId> {
        self.ensure_building("add a switch")?;
        Ok(self.graph.add_switch(name)?)
    }

    pub fn add_link<A: Into<String>, B: Into<String>>(
        &mut self,
        a: A,
        b: B,
        shaping: Option<ShapingPolicy>,
    ) -> OrchestratorResult<LinkId> {
        self.ensure_building("add a link")?;
        Ok(self.graph.add_link(a, b, shaping)?)
    }

    /// Validate the declared graph without realizing it.
    pub fn validate(&self) -> OrchestratorResult<()> {
        Ok(self.graph.validate()?)
    }

    /// Number of live handles currently owned.
    pub fn live_handle_count(&self) -> usize {
        self.ledger.len()
    }

    fn ensure_building(&self, operation: &'static str) -> OrchestratorResult<()> {
        if self.state.accepts_declarations() {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let orphans = self.orphans.take();
        if self.ledger.is_empty() && orphans.is_empty() {
            return;
        }
        let ledger = std::mem::take(&mut self.ledger);
        let count = ledger.len() + orphans.len();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    "orchestrator dropped while {} with {} live or pending resources, tearing down in background",
                    self.state, count
                );
                let backend = self.backend.clone();
                let fabric = self.fabric.clone();
                let parallel = self.config.parallel_teardown;
                runtime.spawn(async move {
                    let mut ledger = ledger;
                    ledger.extend(lifecycle::collect_orphans(orphans).await);
                    if let Err(e) = lifecycle::release_resources(backend, fabric, ledger, parallel).await {
                        warn!("Failed to cleanup after dropped orchestrator: {}", e);
                    }
                });
            }
            Err(_) => {
                error!(
                    "orchestrator dropped outside a tokio runtime with {} live or pending resources; they were leaked",
                    count
                );
            }
        }
    }
}

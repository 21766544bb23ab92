// ============================================================================
// File: src/orchestrator/lifecycle.rs
// ----------------------------------------------------------------------------
// realize() and teardown().
//
// Realization runs in phases (nodes, switches, link waves, addresses) and
// records every created handle in creation order. Teardown releases the
// ledger in reverse, one resource kind at a time.
// ============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, error, info, warn};

use super::plan::{PlannedEnd, PlannedLink, RealizationPlan};
use super::{LiveResource, Orchestrator, OrchestratorError, OrchestratorResult, OrchestratorState};
use super::errors::{ProvisionError, ReleaseFailure, ResourceRef, TeardownError};
use crate::async_task::{AsyncTask, AsyncTaskBuilder, join_or};
use crate::backends::{BackendError, BackendResult, IsolationBackend, NodeHandle};
use crate::fabric::{Attachment, FabricResult, LinkFabric, SwitchHandle};

/// Why provisioning stopped early.
enum Abort {
    Failed { resource: ResourceRef, cause: ProvisionError },
    Cancelled,
}

/// A spawned creation, yielding the resource it brought up (if any).
pub(crate) type Creation = AsyncTask<Result<Option<LiveResource>, ProvisionError>>;

/// Creations nobody is waiting for any more.
///
/// When a `realize()` future is dropped mid-batch its spawned creations keep
/// running; they land here so teardown (or `Drop`) can await and release
/// whatever they produce.
#[derive(Debug, Clone, Default)]
pub(crate) struct Orphans(Arc<Mutex<Vec<Creation>>>);

impl Orphans {
    fn adopt(&self, task: Creation) {
        self.lock().push(task);
    }

    pub(crate) fn take(&self) -> Vec<Creation> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Creation>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Await orphaned creations and collect the resources they brought up.
pub(crate) async fn collect_orphans(tasks: Vec<Creation>) -> Vec<LiveResource> {
    let mut adopted = Vec::new();
    for task in tasks {
        match task.await {
            Ok(Ok(Some(resource))) => {
                debug!("adopted {} from an abandoned realization", resource.resource_ref());
                adopted.push(resource);
            }
            // A failed creation cleans up after itself.
            Ok(Ok(None)) | Ok(Err(_)) => {}
            Err(join) => warn!("Failed to await abandoned creation: {}", join),
        }
    }
    adopted
}

/// A creation being awaited by `settle`. Dropped before completion, it hands
/// its task over to [`Orphans`].
struct InFlight {
    resource: ResourceRef,
    task: Option<Creation>,
    orphans: Orphans,
}

impl InFlight {
    fn new<T, E>(
        resource: ResourceRef,
        task: AsyncTask<Result<T, E>>,
        orphans: &Orphans,
        into_resource: impl FnOnce(T) -> Option<LiveResource> + Send + 'static,
    ) -> Self
    where
        T: Send + 'static,
        E: Into<ProvisionError> + Send + 'static,
    {
        let creation = AsyncTaskBuilder::new(async move {
            match task.await {
                Ok(Ok(value)) => Ok(into_resource(value)),
                Ok(Err(e)) => Err(e.into()),
                Err(join) => Err(ProvisionError::Aborted(join.to_string())),
            }
        })
        .spawn();
        Self {
            resource,
            task: Some(creation),
            orphans: orphans.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.orphans.adopt(task);
        }
    }
}

/// Await a batch of creations, keeping the resources they produced in batch
/// order.
///
/// Every task is awaited even after a failure so nothing created is lost.
async fn settle(batch: Vec<InFlight>) -> (Vec<LiveResource>, Option<Abort>) {
    let mut created = Vec::with_capacity(batch.len());
    let mut failure = None;
    for mut flight in batch {
        let Some(task) = flight.task.as_mut() else {
            continue;
        };
        let outcome = task.await;
        flight.task = None;

        let cause = match outcome {
            Ok(Ok(resource)) => {
                created.extend(resource);
                continue;
            }
            Ok(Err(cause)) => cause,
            Err(join) => ProvisionError::Aborted(join.to_string()),
        };
        error!("Failed to create {}: {}", flight.resource, cause);
        if failure.is_none() {
            failure = Some(Abort::Failed {
                resource: flight.resource.clone(),
                cause,
            });
        }
    }
    (created, failure)
}

impl Orchestrator {
    /// Realize the declared graph.
    ///
    /// Validation failures leave the orchestrator in `Building`. Any
    /// provisioning failure (or cancellation) moves it to `Failed` after
    /// tearing down everything created so far.
    pub async fn realize(&mut self) -> OrchestratorResult<()> {
        if self.state != OrchestratorState::Building {
            return Err(OrchestratorError::InvalidState {
                operation: "realize",
                state: self.state,
            });
        }
        self.graph.validate()?;

        let plan = RealizationPlan::build(&self.graph);
        self.transition(OrchestratorState::Realizing);
        info!(
            "realizing {} nodes, {} switches, {} links with {} backend and {} fabric",
            plan.nodes.len(),
            plan.switches.len(),
            plan.link_count(),
            self.backend.backend_type(),
            self.fabric.fabric_type()
        );

        let Err(abort) = self.provision(&plan).await else {
            self.realized_at = Some(Utc::now());
            self.transition(OrchestratorState::Live);
            info!("topology live with {} handles", self.ledger.len());
            return Ok(());
        };

        self.transition(OrchestratorState::Failed);
        let cleanup = self.release_all().await.err();
        Err(match abort {
            Abort::Failed { resource, cause } => {
                error!("realization failed at {}: {}", resource, cause);
                OrchestratorError::RealizationFailed {
                    resource,
                    cause,
                    cleanup,
                }
            }
            Abort::Cancelled => {
                warn!("realization cancelled");
                OrchestratorError::Cancelled { cleanup }
            }
        })
    }

    /// Release every live handle in reverse creation order.
    ///
    /// Release failures are logged and collected; the orchestrator always
    /// ends in `Terminated`. Calling this again is a no-op.
    pub async fn teardown(&mut self) -> OrchestratorResult<()> {
        match self.state {
            OrchestratorState::Terminated | OrchestratorState::Failed => {
                debug!("teardown requested while {}, nothing to do", self.state);
                return Ok(());
            }
            OrchestratorState::Building => {
                self.transition(OrchestratorState::Terminated);
                return Ok(());
            }
            // Realizing/TearingDown only remain visible if the future driving
            // them was dropped; finish the job.
            OrchestratorState::Live | OrchestratorState::Realizing | OrchestratorState::TearingDown => {}
        }

        self.transition(OrchestratorState::TearingDown);
        let result = self.release_all().await;
        self.transition(OrchestratorState::Terminated);
        Ok(result?)
    }

    /// Realize, run `body` against the live topology, then tear down.
    ///
    /// Teardown runs whatever `body` returns; a `body` that can fail should
    /// return a `Result` and let the caller inspect it.
    pub async fn with_live<T, F>(&mut self, body: F) -> OrchestratorResult<T>
    where
        F: AsyncFnOnce(&Orchestrator) -> T,
    {
        self.realize().await?;
        let output = body(&*self).await;
        self.teardown().await?;
        Ok(output)
    }

    pub(super) fn transition(&mut self, next: OrchestratorState) {
        info!("orchestrator {} -> {}", self.state, next);
        self.state = next;
    }

    async fn release_all(&mut self) -> Result<(), TeardownError> {
        let mut ledger = std::mem::take(&mut self.ledger);
        ledger.extend(collect_orphans(self.orphans.take()).await);
        release_resources(
            self.backend.clone(),
            self.fabric.clone(),
            ledger,
            self.config.parallel_teardown,
        )
        .await
    }

    fn checkpoint(&self, phase: &str) -> Result<(), Abort> {
        if self.cancelled() {
            warn!("cancellation observed before {}", phase);
            return Err(Abort::Cancelled);
        }
        Ok(())
    }

    fn step(&self, len: usize) -> usize {
        if self.config.parallel_realize { len.max(1) } else { 1 }
    }

    async fn provision(&mut self, plan: &RealizationPlan) -> Result<(), Abort> {
        let backend = self.backend.clone();
        let fabric = self.fabric.clone();
        let orphans = self.orphans.clone();

        // Images first, so a missing one fails before any node exists.
        let prepared = join_or(backend.prepare(&plan.nodes), |message| BackendError::Internal { message }).await;
        if let Err(e) = prepared {
            let name = e
                .node()
                .map(str::to_string)
                .or_else(|| plan.nodes.first().map(|n| n.name.clone()))
                .unwrap_or_default();
            error!("image resolution failed: {}", e);
            return Err(Abort::Failed {
                resource: ResourceRef::node(name),
                cause: e.into(),
            });
        }

        let mut nodes: HashMap<String, NodeHandle> = HashMap::new();
        for chunk in plan.nodes.chunks(self.step(plan.nodes.len())) {
            self.checkpoint("node creation")?;
            let batch = chunk
                .iter()
                .map(|spec| {
                    let task = backend.create(spec.clone());
                    InFlight::new(ResourceRef::node(&spec.name), task, &orphans, |handle| {
                        Some(LiveResource::Node(handle))
                    })
                })
                .collect();
            let (created, failure) = settle(batch).await;
            for resource in created {
                if let LiveResource::Node(handle) = &resource {
                    debug!("node {} live", handle.name());
                    nodes.insert(handle.name().to_string(), handle.clone());
                }
                self.ledger.push(resource);
            }
            if let Some(abort) = failure {
                return Err(abort);
            }
        }

        let mut switches: HashMap<String, SwitchHandle> = HashMap::new();
        for chunk in plan.switches.chunks(self.step(plan.switches.len())) {
            self.checkpoint("switch creation")?;
            let batch = chunk
                .iter()
                .map(|name| {
                    let task = fabric.add_switch(name.clone());
                    InFlight::new(ResourceRef::switch(name), task, &orphans, |handle| {
                        Some(LiveResource::Switch(handle))
                    })
                })
                .collect();
            let (created, failure) = settle(batch).await;
            for resource in created {
                if let LiveResource::Switch(handle) = &resource {
                    switches.insert(handle.name().to_string(), handle.clone());
                }
                self.ledger.push(resource);
            }
            if let Some(abort) = failure {
                return Err(abort);
            }
        }

        for wave in &plan.waves {
            for chunk in wave.chunks(self.step(wave.len())) {
                self.checkpoint("link creation")?;
                let mut batch = Vec::with_capacity(chunk.len());
                for link in chunk {
                    let [a, b] = attachments(link, &nodes, &switches)?;
                    let task = fabric.connect(a, b, link.shaping.clone());
                    let id = link.id;
                    batch.push(InFlight::new(ResourceRef::link(&link.label), task, &orphans, move |handle| {
                        Some(LiveResource::Link { id, handle })
                    }));
                }
                let (created, failure) = settle(batch).await;
                for resource in created {
                    debug!("{} live", resource.resource_ref());
                    self.ledger.push(resource);
                }
                if let Some(abort) = failure {
                    return Err(abort);
                }
            }
        }

        let addressed: Vec<_> = plan
            .addresses
            .iter()
            .filter(|(name, _)| {
                let linked = plan.is_linked(name);
                if !linked {
                    warn!("node {} declares an address but has no links, skipping it", name);
                }
                linked
            })
            .collect();
        for chunk in addressed.chunks(self.step(addressed.len())) {
            self.checkpoint("address assignment")?;
            let mut batch = Vec::with_capacity(chunk.len());
            for (name, address) in chunk.iter().copied() {
                let handle = nodes.get(name).ok_or_else(|| missing(ResourceRef::node(name)))?;
                let task = backend.assign_address(handle, *address);
                batch.push(InFlight::new(ResourceRef::node(name), task, &orphans, |()| None));
            }
            let (_, failure) = settle(batch).await;
            if let Some(abort) = failure {
                return Err(abort);
            }
        }

        Ok(())
    }
}

fn missing(resource: ResourceRef) -> Abort {
    let cause = ProvisionError::Aborted(format!("{resource} was not realized before use"));
    Abort::Failed { resource, cause }
}

fn attachments(
    link: &PlannedLink,
    nodes: &HashMap<String, NodeHandle>,
    switches: &HashMap<String, SwitchHandle>,
) -> Result<[Attachment; 2], Abort> {
    let resolve = |end: &PlannedEnd| match end {
        PlannedEnd::Node { name, interface } => nodes
            .get(name)
            .map(|handle| Attachment::node(handle.clone(), *interface))
            .ok_or_else(|| missing(ResourceRef::node(name))),
        PlannedEnd::Switch { name } => switches
            .get(name)
            .map(|handle| Attachment::switch(handle.clone()))
            .ok_or_else(|| missing(ResourceRef::switch(name))),
    };
    let [a, b] = &link.ends;
    Ok([resolve(a)?, resolve(b)?])
}

/// A release that has been started.
enum PendingRelease {
    Backend(AsyncTask<BackendResult<()>>),
    Fabric(AsyncTask<FabricResult<()>>),
}

impl PendingRelease {
    fn start(backend: &dyn IsolationBackend, fabric: &dyn LinkFabric, resource: &LiveResource) -> Self {
        match resource {
            LiveResource::Node(handle) => PendingRelease::Backend(backend.destroy(handle)),
            LiveResource::Switch(handle) => PendingRelease::Fabric(fabric.remove_switch(handle)),
            LiveResource::Link { handle, .. } => PendingRelease::Fabric(fabric.disconnect(handle)),
        }
    }

    async fn wait(self) -> Result<(), ProvisionError> {
        let joined = match self {
            PendingRelease::Backend(task) => task.await.map(|r| r.map_err(ProvisionError::from)),
            PendingRelease::Fabric(task) => task.await.map(|r| r.map_err(ProvisionError::from)),
        };
        joined.unwrap_or_else(|join| Err(ProvisionError::Aborted(join.to_string())))
    }
}

/// Release `ledger` (in creation order) from last to first.
///
/// Kinds form barriers: every link release finishes before any switch
/// release starts, and switches before nodes. Within a kind, releases run
/// concurrently when `parallel` is set.
pub(crate) async fn release_resources(
    backend: Arc<dyn IsolationBackend>,
    fabric: Arc<dyn LinkFabric>,
    ledger: Vec<LiveResource>,
    parallel: bool,
) -> Result<(), TeardownError> {
    let total = ledger.len();
    let reversed: Vec<LiveResource> = ledger.into_iter().rev().collect();
    let mut failures = Vec::new();

    for group in reversed.chunk_by(|a, b| a.kind() == b.kind()) {
        let step = if parallel { group.len() } else { 1 };
        for chunk in group.chunks(step) {
            let pending: Vec<_> = chunk
                .iter()
                .map(|resource| (resource, PendingRelease::start(&*backend, &*fabric, resource)))
                .collect();
            for (resource, release) in pending {
                let resource = resource.resource_ref();
                match release.wait().await {
                    Ok(()) => debug!("released {}", resource),
                    Err(cause) => {
                        warn!("Failed to release {}: {}", resource, cause);
                        failures.push(ReleaseFailure { resource, cause });
                    }
                }
            }
        }
    }

    if failures.is_empty() {
        info!("released {} resources", total);
        Ok(())
    } else {
        warn!("released {} of {} resources", total - failures.len(), total);
        Err(TeardownError { failures })
    }
}

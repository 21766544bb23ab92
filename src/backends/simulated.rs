// ============================================================================
// File: src/backends/simulated.rs
// ----------------------------------------------------------------------------
// In-memory isolation backend.
//
// Creates no host resources. Every operation is recorded in a
// SimulationJournal and can be made to fail through a FaultPlan, which makes
// orchestration ordering and failure handling testable without privileges.
// ============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use uuid::Uuid;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::backends::config::BackendConfig;
use crate::backends::errors::{BackendError, BackendResult};
use crate::backends::images::{self, HostImages, ImageResolver};
use crate::backends::trait_def::IsolationBackend;
use crate::backends::types::{ExecResult, HealthStatus, NodeHandle};
use crate::simulation::{FaultPlan, JournalEvent, SimulationJournal};
use crate::topology::{NodeAddress, NodeSpec};

/// Backend that only pretends to isolate nodes.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    config: BackendConfig,
    journal: SimulationJournal,
    faults: Arc<FaultPlan>,
    images: Arc<dyn ImageResolver>,
    live: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl SimulatedBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            journal: SimulationJournal::new(),
            faults: Arc::new(FaultPlan::default()),
            images: Arc::new(HostImages),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_journal(mut self, journal: SimulationJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    /// Resolve node images with `images`; the resolved paths are not used.
    pub fn with_images(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = images;
        self
    }

    pub fn journal(&self) -> &SimulationJournal {
        &self.journal
    }

    /// Number of nodes created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live_map().len()
    }

    pub fn live_nodes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live_map().values().cloned().collect();
        names.sort();
        names
    }

    fn live_map(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, String>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl IsolationBackend for SimulatedBackend {
    fn prepare(&self, nodes: &[NodeSpec]) -> AsyncTask<BackendResult<()>> {
        let resolver = self.images.clone();
        let nodes = nodes.to_vec();
        AsyncTaskBuilder::new(async move { images::resolve_all(resolver.as_ref(), &nodes) }).spawn()
    }

    fn create(&self, spec: NodeSpec) -> AsyncTask<BackendResult<NodeHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move {
            let delay = this.faults.create_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if this.faults.create_fails(&spec.name) {
                return Err(BackendError::LaunchFailed {
                    node: spec.name,
                    details: "injected launch failure".to_string(),
                });
            }

            let handle = NodeHandle::new(spec.name.clone(), format!("sim-{}", spec.name));
            this.live_map().insert(handle.id(), spec.name.clone());
            this.journal.record(JournalEvent::NodeCreated(spec.name.clone()));
            debug!("simulated node {} created", spec.name);
            Ok(handle)
        })
        .spawn()
    }

    fn exec(&self, handle: &NodeHandle, command: Vec<String>) -> AsyncTask<BackendResult<ExecResult>> {
        let this = self.clone();
        let handle = handle.clone();
        AsyncTaskBuilder::new(async move {
            let Some(_guard) = handle.token().acquire().await else {
                return Err(BackendError::EndpointUnavailable {
                    node: handle.name().to_string(),
                });
            };
            let stdout = command.join(" ");
            this.journal.record(JournalEvent::Exec {
                node: handle.name().to_string(),
                command,
            });
            Ok(ExecResult::success(stdout))
        })
        .spawn()
    }

    fn assign_address(&self, handle: &NodeHandle, address: NodeAddress) -> AsyncTask<BackendResult<()>> {
        let this = self.clone();
        let handle = handle.clone();
        AsyncTaskBuilder::new(async move {
            let Some(_guard) = handle.token().acquire().await else {
                return Err(BackendError::EndpointUnavailable {
                    node: handle.name().to_string(),
                });
            };
            this.journal.record(JournalEvent::AddressAssigned {
                node: handle.name().to_string(),
                address,
            });
            Ok(())
        })
        .spawn()
    }

    fn destroy(&self, handle: &NodeHandle) -> AsyncTask<BackendResult<()>> {
        let this = self.clone();
        let handle = handle.clone();
        AsyncTaskBuilder::new(async move {
            let Some(release) = handle.token().begin_release().await else {
                return Ok(());
            };
            if this.faults.destroy_fails(handle.name()) {
                return Err(BackendError::DestroyFailed {
                    node: handle.name().to_string(),
                    details: "injected destroy failure".to_string(),
                });
            }

            this.live_map().remove(&handle.id());
            this.journal.record(JournalEvent::NodeDestroyed(handle.name().to_string()));
            release.complete();
            Ok(())
        })
        .spawn()
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let live = self.live_count();
        AsyncTaskBuilder::new(async move {
            info!("simulated backend health check");
            HealthStatus::healthy("Simulated backend ready").with_metric("live_nodes", live.to_string())
        })
        .spawn()
    }

    fn get_config(&self) -> &BackendConfig {
        &self.config
    }

    fn backend_type(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimulatedBackend {
        SimulatedBackend::new(BackendConfig::new("sim").with_sudo(false))
    }

    #[tokio::test]
    async fn create_exec_destroy() {
        let backend = backend();
        let handle = backend.create(NodeSpec::new("n1")).await.expect("join").expect("create");
        assert_eq!(backend.live_count(), 1);

        let result = backend
            .exec(&handle, vec!["echo".into(), "hi".into()])
            .await
            .expect("join")
            .expect("exec");
        assert!(result.is_success());

        backend.destroy(&handle).await.expect("join").expect("destroy");
        assert_eq!(backend.live_count(), 0);
    }

    #[tokio::test]
    async fn destroyed_handle_is_unavailable() {
        let backend = backend();
        let handle = backend.create(NodeSpec::new("n1")).await.expect("join").expect("create");
        backend.destroy(&handle).await.expect("join").expect("destroy");

        let err = backend
            .exec(&handle, vec!["true".into()])
            .await
            .expect("join")
            .expect_err("handle is gone");
        assert!(matches!(err, BackendError::EndpointUnavailable { .. }));

        // Second destroy is a no-op.
        backend.destroy(&handle).await.expect("join").expect("idempotent");
        assert_eq!(backend.journal().releases().len(), 1);
    }

    #[tokio::test]
    async fn injected_create_failure_leaves_nothing() {
        let backend = backend().with_faults(FaultPlan::new().fail_create("bad"));
        let err = backend
            .create(NodeSpec::new("bad"))
            .await
            .expect("join")
            .expect_err("injected");
        assert_eq!(err.node(), Some("bad"));
        assert_eq!(backend.live_count(), 0);
        assert!(backend.journal().events().is_empty());
    }

    #[tokio::test]
    async fn failed_destroy_keeps_handle_live() {
        let backend = backend().with_faults(FaultPlan::new().fail_destroy("n1"));
        let handle = backend.create(NodeSpec::new("n1")).await.expect("join").expect("create");

        assert!(backend.destroy(&handle).await.expect("join").is_err());
        assert!(handle.token().is_live().await);
        assert_eq!(backend.live_nodes(), vec!["n1".to_string()]);
    }
}

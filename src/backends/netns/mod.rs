// ============================================================================
// File: src/backends/netns/mod.rs
// ----------------------------------------------------------------------------
// Linux network-namespace isolation backend.
//
// Each node gets a named network namespace and an init process running in a
// private PID namespace inside it. Host commands go through PrivilegeManager
// so the backend works as root or through passwordless sudo.
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::process::Child;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::async_task::{AsyncTask, AsyncTaskBuilder};
use crate::backends::config::BackendConfig;
use crate::backends::errors::{BackendError, BackendResult};
use crate::backends::images::{self, HostImages, ImageResolver};
use crate::backends::trait_def::IsolationBackend;
use crate::backends::types::{ExecResult, HealthStatus, NodeHandle, interface_name};
use crate::linux::{EnvironmentDetector, PrivilegeManager, terminate_with_grace};
use crate::topology::{NodeAddress, NodeSpec};

mod launch;

#[cfg(test)]
mod tests;

/// Host tools the backend shells out to.
const REQUIRED_TOOLS: &[&str] = &["ip", "unshare", "kill"];

/// Isolation backend built on `ip netns` and `unshare`.
#[derive(Debug, Clone)]
pub struct NetnsBackend {
    config: BackendConfig,
    privilege: PrivilegeManager,
    images: Arc<dyn ImageResolver>,
    /// Distinguishes namespaces of concurrent orchestrators on one host
    session: String,
    inits: Arc<Mutex<HashMap<Uuid, Child>>>,
}

impl NetnsBackend {
    /// Create a new namespace backend
    ///
    /// # Arguments
    /// * `config` - Backend configuration
    ///
    /// # Returns
    /// New backend or `NotAvailable` if not running on Linux
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        if !cfg!(target_os = "linux") {
            return Err(BackendError::NotAvailable {
                backend: "netns",
                reason: "network namespaces are only available on Linux".to_string(),
            });
        }

        let privilege = PrivilegeManager::new(config.use_sudo, config.command_timeout);
        let session = Uuid::new_v4().simple().to_string()[..6].to_string();
        Ok(Self {
            config,
            privilege,
            images: Arc::new(HostImages),
            session,
            inits: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Use `images` to resolve node image references.
    pub fn with_images(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = images;
        self
    }

    /// Namespace name for a node of this backend.
    pub fn namespace_for(&self, node: &str) -> String {
        format!("{}-{}-{}", self.config.namespace_prefix, self.session, node)
    }

    async fn create_node(&self, spec: NodeSpec) -> BackendResult<NodeHandle> {
        let rootfs = match &spec.image {
            Some(image) => self.images.resolve(&spec.name, image)?,
            None => None,
        };
        let namespace = self.namespace_for(&spec.name);
        let command = spec.command.clone().unwrap_or_else(|| self.config.default_init.clone());

        self.privilege
            .run_checked(&["ip", "netns", "add", &namespace])
            .await
            .map_err(|e| BackendError::launch(&spec.name, e))?;

        match self.start_init(&spec.name, &namespace, rootfs.as_deref(), &command).await {
            Ok(child) => {
                let handle = NodeHandle::new(spec.name.clone(), namespace)
                    .with_rootfs(rootfs)
                    .with_init_pid(child.id());
                self.inits.lock().await.insert(handle.id(), child);
                info!("node {} running in {}", spec.name, handle.namespace());
                Ok(handle)
            }
            Err(e) => {
                self.discard_namespace(&namespace).await;
                Err(e)
            }
        }
    }

    async fn start_init(
        &self,
        node: &str,
        namespace: &str,
        rootfs: Option<&std::path::Path>,
        command: &str,
    ) -> BackendResult<Child> {
        let lo = ["ip", "-n", namespace, "link", "set", "lo", "up"];
        self.privilege
            .run_checked(&lo)
            .await
            .map_err(|e| BackendError::launch(node, e))?;

        let mut child =
            launch::spawn_init(&self.privilege, namespace, rootfs, command).map_err(|e| BackendError::launch(node, e))?;

        if let Some(details) = launch::check_started(&mut child, self.config.launch_check).await {
            // Reap whatever is left of the group before reporting.
            if let Err(e) = terminate_with_grace(&mut child, &self.privilege, self.config.stop_grace).await {
                warn!("Failed to cleanup init of {}: {}", node, e);
            }
            return Err(BackendError::LaunchFailed {
                node: node.to_string(),
                details,
            });
        }
        Ok(child)
    }

    /// Best-effort removal of a namespace whose node never came up.
    async fn discard_namespace(&self, namespace: &str) {
        if let Err(e) = launch::sweep_namespace(&self.privilege, namespace).await {
            warn!("Failed to cleanup processes in {}: {}", namespace, e);
        }
        if let Err(e) = self.privilege.run_idempotent(&["ip", "netns", "del", namespace]).await {
            warn!("Failed to cleanup namespace {}: {}", namespace, e);
        }
    }

    async fn destroy_node(&self, handle: NodeHandle) -> BackendResult<()> {
        let Some(release) = handle.token().begin_release().await else {
            debug!("node {} already destroyed", handle.name());
            return Ok(());
        };
        let failed = |details: String| BackendError::DestroyFailed {
            node: handle.name().to_string(),
            details,
        };

        let init = self.inits.lock().await.remove(&handle.id());
        if let Some(mut child) = init {
            match terminate_with_grace(&mut child, &self.privilege, self.config.stop_grace).await {
                Ok(outcome) => debug!("init of {} stopped: {:?}", handle.name(), outcome),
                Err(e) => warn!("Failed to stop init of {}: {}", handle.name(), e),
            }
        }

        launch::sweep_namespace(&self.privilege, handle.namespace())
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.privilege
            .run_idempotent(&["ip", "netns", "del", handle.namespace()])
            .await
            .map_err(|e| failed(e.to_string()))?;

        release.complete();
        info!("node {} destroyed", handle.name());
        Ok(())
    }
}

impl IsolationBackend for NetnsBackend {
    fn prepare(&self, nodes: &[NodeSpec]) -> AsyncTask<BackendResult<()>> {
        let resolver = self.images.clone();
        let nodes = nodes.to_vec();
        AsyncTaskBuilder::new(async move { images::resolve_all(resolver.as_ref(), &nodes) }).spawn()
    }

    fn create(&self, spec: NodeSpec) -> AsyncTask<BackendResult<NodeHandle>> {
        let this = self.clone();
        AsyncTaskBuilder::new(async move { this.create_node(spec).await }).spawn()
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
            launch::run_in_namespace(
                &this.privilege,
                handle.name(),
                handle.namespace(),
                handle.rootfs(),
                &command,
                this.config.exec_timeout,
            )
            .await
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
            let namespace = handle.namespace();
            let device = interface_name(0);
            let cidr = address.to_string();

            for args in [
                ["ip", "-n", namespace, "addr", "replace", cidr.as_str(), "dev", device.as_str()],
                ["ip", "-n", namespace, "link", "set", "dev", device.as_str(), "up"],
            ] {
                this.privilege
                    .run_checked(&args)
                    .await
                    .map_err(|e| BackendError::AddressFailed {
                        node: handle.name().to_string(),
                        details: e.to_string(),
                    })?;
            }
            debug!("assigned {} to {} in {}", cidr, device, namespace);
            Ok(())
        })
        .spawn()
    }

    fn destroy(&self, handle: &NodeHandle) -> AsyncTask<BackendResult<()>> {
        let this = self.clone();
        let handle = handle.clone();
        AsyncTaskBuilder::new(async move { this.destroy_node(handle).await }).spawn()
    }

    fn health_check(&self) -> AsyncTask<HealthStatus> {
        let privilege = self.privilege.clone();
        AsyncTaskBuilder::new(async move {
            let tools = EnvironmentDetector::tools(REQUIRED_TOOLS);
            let missing: Vec<&str> = tools.iter().filter(|t| !t.available).map(|t| t.name).collect();
            if !missing.is_empty() {
                return HealthStatus::unhealthy(format!("Missing host tools: {}", missing.join(", ")));
            }
            if !EnvironmentDetector::netns_supported(&privilege).await {
                return HealthStatus::unhealthy("Cannot create network namespaces (need root or passwordless sudo)")
                    .with_metric("sudo", privilege.uses_sudo().to_string());
            }
            HealthStatus::healthy("Network namespace backend ready")
                .with_metric("sudo", privilege.uses_sudo().to_string())
        })
        .spawn()
    }

    fn get_config(&self) -> &BackendConfig {
        &self.config
    }

    fn backend_type(&self) -> &'static str {
        "netns"
    }
}

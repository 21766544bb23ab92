// ============================================================================
// File: src/backends/trait_def.rs
// ----------------------------------------------------------------------------
// IsolationBackend trait definition
// ============================================================================

use crate::async_task::AsyncTask;
use crate::backends::config::BackendConfig;
use crate::backends::errors::BackendResult;
use crate::backends::types::{ExecResult, HealthStatus, NodeHandle};
use crate::topology::{NodeAddress, NodeSpec};

/// Provides one isolated execution environment per node.
///
/// Implementations never retry; the orchestrator decides what a failure
/// means. Operations on a destroyed handle fail with `EndpointUnavailable`,
/// except `destroy`, which is a no-op.
pub trait IsolationBackend: Send + Sync + std::fmt::Debug {
    /// Check everything `create` needs for `nodes` (currently their images)
    /// without creating anything.
    fn prepare(&self, nodes: &[NodeSpec]) -> AsyncTask<BackendResult<()>>;

    /// Provision a namespace and launch the node's startup command as its init
    /// process.
    ///
    /// On failure nothing is left behind.
    fn create(&self, spec: NodeSpec) -> AsyncTask<BackendResult<NodeHandle>>;

    /// Run `command` inside the node and collect its output.
    ///
    /// A non-zero exit is reported in the result, not as an error.
    fn exec(&self, handle: &NodeHandle, command: Vec<String>) -> AsyncTask<BackendResult<ExecResult>>;

    /// Configure `address` on the node's first interface.
    fn assign_address(&self, handle: &NodeHandle, address: NodeAddress) -> AsyncTask<BackendResult<()>>;

    /// Stop the node's processes and release its namespace.
    ///
    /// Escalates from SIGTERM to SIGKILL after the configured grace period.
    /// Destroying an already destroyed handle succeeds without doing anything.
    fn destroy(&self, handle: &NodeHandle) -> AsyncTask<BackendResult<()>>;

    /// Check that the backend can operate on this host.
    fn health_check(&self) -> AsyncTask<HealthStatus>;

    fn get_config(&self) -> &BackendConfig;

    /// Backend type identifier
    fn backend_type(&self) -> &'static str;
}

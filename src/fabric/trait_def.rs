// ============================================================================
// File: src/fabric/trait_def.rs
// ----------------------------------------------------------------------------
// LinkFabric trait definition
// ============================================================================

use crate::async_task::AsyncTask;
use crate::backends::HealthStatus;
use crate::fabric::config::FabricConfig;
use crate::fabric::errors::FabricResult;
use crate::fabric::types::{Attachment, LinkHandle, SwitchHandle};
use crate::topology::ShapingPolicy;

/// Creates switches and links between live nodes and applies shaping.
///
/// Like backends, fabrics never retry. Releasing an already released switch
/// or link is a no-op.
pub trait LinkFabric: Send + Sync + std::fmt::Debug {
    /// Create a forwarding point for `name`.
    fn add_switch(&self, name: String) -> AsyncTask<FabricResult<SwitchHandle>>;

    /// Remove a switch. Links attached to it must be disconnected first.
    fn remove_switch(&self, switch: &SwitchHandle) -> AsyncTask<FabricResult<()>>;

    /// Connect two endpoints, installing `shaping` on the link's own devices.
    ///
    /// Fails with `EndpointUnavailable` if either endpoint was already
    /// released. On any other failure nothing is left behind.
    fn connect(&self, a: Attachment, b: Attachment, shaping: Option<ShapingPolicy>) -> AsyncTask<FabricResult<LinkHandle>>;

    /// Replace the link's shaping; `None` clears it.
    fn reshape(&self, link: &LinkHandle, shaping: Option<ShapingPolicy>) -> AsyncTask<FabricResult<()>>;

    /// Remove a link.
    fn disconnect(&self, link: &LinkHandle) -> AsyncTask<FabricResult<()>>;

    /// Check that the fabric can operate on this host.
    fn health_check(&self) -> AsyncTask<HealthStatus>;

    fn get_config(&self) -> &FabricConfig;

    /// Fabric type identifier
    fn fabric_type(&self) -> &'static str;
}

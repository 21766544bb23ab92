// ============================================================================
// File: src/fabric/factory.rs
// ----------------------------------------------------------------------------
// Fabric factory functions
// ============================================================================

use std::sync::Arc;

use crate::backends::BackendKind;
use crate::fabric::config::FabricConfig;
use crate::fabric::errors::FabricResult;
use crate::fabric::netns::NetnsFabric;
use crate::fabric::simulated::SimulatedFabric;
use crate::fabric::trait_def::LinkFabric;

/// Fabrics come in the same flavours as backends and must be paired with
/// the matching one: a netns fabric needs namespaces, a simulated fabric
/// accepts simulated handles only.
pub type FabricKind = BackendKind;

/// Create the fabric matching `kind`.
pub fn create_fabric(kind: FabricKind, config: FabricConfig) -> FabricResult<Arc<dyn LinkFabric>> {
    match kind {
        BackendKind::Netns => Ok(Arc::new(NetnsFabric::new(config)?)),
        BackendKind::Simulated => Ok(Arc::new(SimulatedFabric::new(config))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_fabric_always_builds() {
        let fabric = create_fabric(FabricKind::Simulated, FabricConfig::new("sim")).expect("simulated");
        assert_eq!(fabric.fabric_type(), "simulated");
    }
}

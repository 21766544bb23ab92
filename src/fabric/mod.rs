// ============================================================================
// File: src/fabric/mod.rs
// ----------------------------------------------------------------------------
// Link fabric: switches, point-to-point links and per-link shaping.
//
// Provides:
// - LinkFabric trait for add_switch / connect / reshape / disconnect
// - Handle types for switches and links
// - Linux implementation on veth pairs, bridges and tc qdiscs
// - In-memory simulated implementation
// ============================================================================

mod config;
mod errors;
mod factory;
mod trait_def;
mod types;

pub mod netns;
pub mod simulated;

pub use config::FabricConfig;
pub use errors::{FabricError, FabricResult};
pub use factory::{FabricKind, create_fabric};
pub use netns::NetnsFabric;
pub use simulated::SimulatedFabric;
pub use trait_def::LinkFabric;
pub use types::{Attachment, LinkEnd, LinkHandle, SwitchHandle};

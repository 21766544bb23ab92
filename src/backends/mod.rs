// ============================================================================
// File: src/backends/mod.rs
// ----------------------------------------------------------------------------
// Isolation backends: one isolated execution environment per topology node.
//
// Provides a unified interface over the ways a node can be realized:
// - IsolationBackend trait for create / exec / assign_address / destroy
// - Backend-specific error types and configuration
// - Image resolution for node root filesystems
// - Linux network-namespace backend and an in-memory simulated backend
// ============================================================================

mod config;
mod errors;
mod factory;
mod images;
mod trait_def;
mod types;

pub mod netns;
pub mod simulated;

pub use config::BackendConfig;
pub use errors::{BackendError, BackendResult};
pub use factory::{BackendKind, available_backends, create_backend};
pub use images::{DirectoryImages, HostImages, ImageResolver};
pub use netns::NetnsBackend;
pub use simulated::SimulatedBackend;
pub use trait_def::IsolationBackend;
pub use types::{ExecResult, HealthStatus, NodeHandle, interface_name};

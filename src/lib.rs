// ============================================================================
// File: src/lib.rs
// ----------------------------------------------------------------------------
// toponet: declare a virtual network topology, realize it on the host as
// isolated nodes joined by switches and shaped links, and tear it down again.
//
// Provides:
// - Topology graph declaration and validation
// - Isolation backends (Linux network namespaces, simulated)
// - Link fabrics (veth + bridge + tc, simulated)
// - Orchestrator state machine with reverse-order teardown
// ============================================================================

pub mod async_task;
pub mod backends;
pub mod fabric;
pub mod handle;
pub mod linux;
pub mod orchestrator;
pub mod simulation;
pub mod topology;

pub use async_task::{AsyncTask, AsyncTaskBuilder};
pub use backends::{
    BackendConfig, BackendError, BackendKind, BackendResult, ExecResult, HealthStatus, IsolationBackend, NodeHandle,
    available_backends, create_backend,
};
pub use fabric::{FabricConfig, FabricError, FabricResult, LinkFabric, LinkHandle, SwitchHandle, create_fabric};
pub use orchestrator::{
    CancelHandle, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorResult, OrchestratorState,
    PingReport, TeardownError, TopologyReport,
};
pub use simulation::{FaultPlan, JournalEvent, SimulationJournal};
pub use topology::{
    ConfigError, LinkId, LinkSpec, NodeAddress, NodeSpec, ShapingPolicy, TopologyConfig, TopologyGraph,
    ValidationError,
};

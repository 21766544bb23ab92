// ============================================================================
// File: src/orchestrator/state.rs
// ----------------------------------------------------------------------------
// Orchestrator lifecycle states
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an orchestrator is in its lifecycle.
///
/// ```text
/// Building -> Realizing -> Live -> TearingDown -> Terminated
///                  \
///                   -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Accepting declarations
    Building,
    /// Creating resources
    Realizing,
    /// Every resource exists; exec and reshape are allowed
    Live,
    /// Releasing resources
    TearingDown,
    /// Everything released (or reported as unreleasable)
    Terminated,
    /// Realization failed or was cancelled; partial state was torn down
    Failed,
}

impl OrchestratorState {
    pub fn accepts_declarations(self) -> bool {
        self == OrchestratorState::Building
    }

    /// No further transitions happen from here.
    pub fn is_final(self) -> bool {
        matches!(self, OrchestratorState::Terminated | OrchestratorState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Building => "building",
            OrchestratorState::Realizing => "realizing",
            OrchestratorState::Live => "live",
            OrchestratorState::TearingDown => "tearing_down",
            OrchestratorState::Terminated => "terminated",
            OrchestratorState::Failed => "failed",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

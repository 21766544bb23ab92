// ============================================================================
// File: src/orchestrator/errors.rs
// ----------------------------------------------------------------------------
// Orchestrator error types
// ============================================================================

use std::fmt;

use serde::Serialize;

use super::state::OrchestratorState;
use crate::backends::BackendError;
use crate::fabric::FabricError;
use crate::topology::ValidationError;

/// Kinds of live resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Node,
    Switch,
    Link,
}

/// Names one live (or failed-to-be-live) resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    /// Node or switch name, or link label `a--b`
    pub name: String,
}

impl ResourceRef {
    pub fn node<N: Into<String>>(name: N) -> Self {
        Self {
            kind: ResourceKind::Node,
            name: name.into(),
        }
    }

    pub fn switch<N: Into<String>>(name: N) -> Self {
        Self {
            kind: ResourceKind::Switch,
            name: name.into(),
        }
    }

    pub fn link<N: Into<String>>(label: N) -> Self {
        Self {
            kind: ResourceKind::Link,
            name: label.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Node => write!(f, "node '{}'", self.name),
            ResourceKind::Switch => write!(f, "switch '{}'", self.name),
            ResourceKind::Link => write!(f, "link {}", self.name),
        }
    }
}

/// Raw cause of a provisioning or release failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    /// The spawned operation panicked or its runtime shut down
    #[error("operation did not complete: {0}")]
    Aborted(String),
}

/// One resource that could not be confirmed released.
#[derive(Debug, Clone)]
pub struct ReleaseFailure {
    pub resource: ResourceRef,
    pub cause: ProvisionError,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.cause)
    }
}

/// Aggregate of every release failure in one teardown.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} resource(s) could not be confirmed released: {}", .failures.len(), list(.failures))]
pub struct TeardownError {
    pub failures: Vec<ReleaseFailure>,
}

impl TeardownError {
    /// Resources left for manual inspection.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceRef> {
        self.failures.iter().map(|f| &f.resource)
    }
}

fn list(failures: &[ReleaseFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

fn cleanup_note(cleanup: &Option<TeardownError>) -> String {
    match cleanup {
        Some(e) => format!(" (cleanup incomplete: {e})"),
        None => String::new(),
    }
}

/// Errors returned by the orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    /// The graph is invalid; still `Building`, fix and retry
    #[error("Invalid topology: {0}")]
    Validation(#[from] ValidationError),

    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: OrchestratorState,
    },

    /// A resource could not be created; everything created before it was
    /// torn down
    #[error("Failed to realize {resource}: {cause}{}", cleanup_note(.cleanup))]
    RealizationFailed {
        resource: ResourceRef,
        cause: ProvisionError,
        cleanup: Option<TeardownError>,
    },

    /// Realization was cancelled; everything created was torn down
    #[error("Realization cancelled{}", cleanup_note(.cleanup))]
    Cancelled { cleanup: Option<TeardownError> },

    #[error("Unknown node '{name}'")]
    UnknownNode { name: String },

    #[error("Unknown link {link}")]
    UnknownLink { link: String },

    /// The resource was already released
    #[error("{resource} is no longer available")]
    EndpointUnavailable { resource: ResourceRef },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl OrchestratorError {
    /// The resource named by a realization failure, if any.
    pub fn failed_resource(&self) -> Option<&ResourceRef> {
        match self {
            OrchestratorError::RealizationFailed { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

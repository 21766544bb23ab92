// ============================================================================
// File: src/backends/errors.rs
// ----------------------------------------------------------------------------
// Isolation backend error types
// ============================================================================

use crate::linux::SysError;

/// Errors raised by isolation backends.
///
/// Every variant names the node it concerns so the orchestrator can report
/// which resource failed without extra bookkeeping.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Backend is not usable on this host
    #[error("Backend {backend} is not available: {reason}")]
    NotAvailable {
        backend: &'static str,
        reason: String,
    },

    /// Namespace creation or init process launch failed; nothing was left behind
    #[error("Failed to launch node '{node}': {details}")]
    LaunchFailed { node: String, details: String },

    /// Image reference could not be resolved to a root filesystem
    #[error("Image '{image}' for node '{node}' is unavailable: {details}")]
    ImageUnavailable {
        node: String,
        image: String,
        details: String,
    },

    /// The node handle was already destroyed
    #[error("Node '{node}' is no longer available")]
    EndpointUnavailable { node: String },

    /// Address assignment failed
    #[error("Failed to assign address to node '{node}': {details}")]
    AddressFailed { node: String, details: String },

    /// The exec'd command could not be run
    #[error("Failed to run command in node '{node}': {details}")]
    ExecFailed { node: String, details: String },

    /// The exec'd command did not finish in time
    #[error("Command in node '{node}' timed out after {seconds} seconds")]
    ExecTimeout { node: String, seconds: u64 },

    /// Resources could not be confirmed released
    #[error("Failed to destroy node '{node}': {details}")]
    DestroyFailed { node: String, details: String },

    /// Internal backend error
    #[error("Internal backend error: {message}")]
    Internal { message: String },
}

impl BackendError {
    pub(crate) fn launch(node: &str, err: SysError) -> Self {
        BackendError::LaunchFailed {
            node: node.to_string(),
            details: err.to_string(),
        }
    }

    /// Name of the node this error concerns, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            BackendError::LaunchFailed { node, .. }
            | BackendError::ImageUnavailable { node, .. }
            | BackendError::EndpointUnavailable { node }
            | BackendError::AddressFailed { node, .. }
            | BackendError::ExecFailed { node, .. }
            | BackendError::ExecTimeout { node, .. }
            | BackendError::DestroyFailed { node, .. } => Some(node),
            BackendError::NotAvailable { .. } | BackendError::Internal { .. } => None,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

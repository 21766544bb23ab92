// ============================================================================
// File: src/fabric/errors.rs
// ----------------------------------------------------------------------------
// Link fabric error types
// ============================================================================

/// Errors raised by link fabrics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FabricError {
    /// Fabric is not usable on this host
    #[error("Fabric {fabric} is not available: {reason}")]
    NotAvailable {
        fabric: &'static str,
        reason: String,
    },

    /// An endpoint (node, switch or link) was already released
    #[error("Endpoint '{endpoint}' is no longer available")]
    EndpointUnavailable { endpoint: String },

    /// Shaping policy out of range
    #[error("Invalid shaping for link {link}: {details}")]
    InvalidShaping { link: String, details: String },

    /// Switch could not be created
    #[error("Failed to create switch '{switch}': {details}")]
    SwitchFailed { switch: String, details: String },

    /// Link could not be created; nothing was left behind
    #[error("Failed to connect link {link}: {details}")]
    ConnectFailed { link: String, details: String },

    /// Shaping could not be applied
    #[error("Failed to shape link {link}: {details}")]
    ShapingFailed { link: String, details: String },

    /// Link could not be confirmed removed
    #[error("Failed to disconnect link {link}: {details}")]
    DisconnectFailed { link: String, details: String },

    /// Switch could not be confirmed removed
    #[error("Failed to remove switch '{switch}': {details}")]
    RemoveFailed { switch: String, details: String },

    /// Internal fabric error
    #[error("Internal fabric error: {message}")]
    Internal { message: String },
}

impl FabricError {
    /// Switch name or link label this error concerns, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            FabricError::EndpointUnavailable { endpoint } => Some(endpoint),
            FabricError::InvalidShaping { link, .. }
            | FabricError::ConnectFailed { link, .. }
            | FabricError::ShapingFailed { link, .. }
            | FabricError::DisconnectFailed { link, .. } => Some(link),
            FabricError::SwitchFailed { switch, .. } | FabricError::RemoveFailed { switch, .. } => Some(switch),
            FabricError::NotAvailable { .. } | FabricError::Internal { .. } => None,
        }
    }
}

/// Result type for fabric operations
pub type FabricResult<T> = Result<T, FabricError>;

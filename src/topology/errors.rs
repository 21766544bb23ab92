// ============================================================================
// File: src/topology/errors.rs
// ----------------------------------------------------------------------------
// Graph-level validation errors
// ============================================================================

/// Errors raised while declaring or validating a topology.
///
/// All of these are recoverable: fix the declaration and validate again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A node or switch with this name already exists
    #[error("Duplicate identity '{name}'")]
    DuplicateIdentity { name: String },

    /// Another node already declares this address
    #[error("Address {address} of '{name}' is already used by '{owner}'")]
    DuplicateAddress {
        name: String,
        address: String,
        owner: String,
    },

    /// A link was added against an endpoint that has not been declared yet
    #[error("Unknown endpoint '{endpoint}' for link {link}")]
    UnknownEndpoint { endpoint: String, link: String },

    /// A declared link refers to an endpoint that was never added
    #[error("Link {link} has dangling endpoint '{endpoint}'")]
    DanglingEndpoint { endpoint: String, link: String },

    /// A node terminates more links than it has interfaces
    #[error("Node '{node}' has {interfaces} interface(s) but {links} links")]
    CapacityExceeded {
        node: String,
        interfaces: u8,
        links: usize,
    },

    /// Both ends of a link are the same entity
    #[error("Link {link} connects '{endpoint}' to itself")]
    SelfLoop { endpoint: String, link: String },

    /// Names must be non-empty and free of whitespace and '/'
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Address could not be parsed or is out of range
    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Shaping values are out of range
    #[error("Invalid shaping policy: {reason}")]
    InvalidShaping { reason: String },
}

/// Result type for graph operations
pub type ValidationResult<T> = Result<T, ValidationError>;

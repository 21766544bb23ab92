// ============================================================================
// File: src/backends/factory.rs
// ----------------------------------------------------------------------------
// Backend factory functions
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::config::BackendConfig;
use crate::backends::errors::BackendResult;
use crate::backends::netns::NetnsBackend;
use crate::backends::simulated::SimulatedBackend;
use crate::backends::trait_def::IsolationBackend;

/// Isolation backends this crate can construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Linux network namespaces
    Netns,
    /// In-memory, no host resources
    Simulated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Netns => "netns",
            BackendKind::Simulated => "simulated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netns" => Ok(BackendKind::Netns),
            "simulated" | "sim" => Ok(BackendKind::Simulated),
            other => Err(format!("unknown backend '{other}' (expected netns or simulated)")),
        }
    }
}

/// Create a backend instance from configuration
///
/// # Arguments
/// * `kind` - Which backend to build
/// * `config` - Backend configuration
///
/// # Returns
/// Shared backend instance or error if the backend is not available
pub fn create_backend(kind: BackendKind, config: BackendConfig) -> BackendResult<Arc<dyn IsolationBackend>> {
    match kind {
        BackendKind::Netns => {
            let backend = NetnsBackend::new(config)?;
            Ok(Arc::new(backend))
        }
        BackendKind::Simulated => Ok(Arc::new(SimulatedBackend::new(config))),
    }
}

/// Get all available backends for the current platform
pub fn available_backends() -> Vec<BackendKind> {
    let mut backends = vec![BackendKind::Simulated];

    #[cfg(target_os = "linux")]
    backends.push(BackendKind::Netns);

    backends
}

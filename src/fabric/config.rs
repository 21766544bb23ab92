// ============================================================================
// File: src/fabric/config.rs
// ----------------------------------------------------------------------------
// Configuration types for link fabrics
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::linux::EnvironmentDetector;

/// Fabric configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Fabric name/identifier
    pub name: String,

    /// Prefix for bridge and veth device names.
    ///
    /// Kept short: Linux caps interface names at 15 bytes.
    pub device_prefix: String,

    /// Run host commands through `sudo -n`
    pub use_sudo: bool,

    /// Upper bound for individual `ip`/`tc` invocations
    pub command_timeout: Duration,
}

impl FabricConfig {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            device_prefix: "tn".to_string(),
            use_sudo: !EnvironmentDetector::is_root(),
            command_timeout: Duration::from_secs(10),
        }
    }

    /// Set the device prefix; anything past 4 bytes is dropped.
    pub fn with_device_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        let mut prefix: String = prefix.into();
        prefix.retain(|c| c.is_ascii_alphanumeric());
        prefix.truncate(4);
        self.device_prefix = prefix;
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

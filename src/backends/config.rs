// ============================================================================
// File: src/backends/config.rs
// ----------------------------------------------------------------------------
// Configuration types for isolation backends
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::linux::EnvironmentDetector;

/// Backend configuration
///
/// Common options for all isolation backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name/identifier
    pub name: String,

    /// Prefix for namespace names created by this backend
    pub namespace_prefix: String,

    /// Run host commands through `sudo -n`
    pub use_sudo: bool,

    /// Time between SIGTERM and SIGKILL when stopping a node
    pub stop_grace: Duration,

    /// How long a freshly launched init must survive to count as started
    pub launch_check: Duration,

    /// Upper bound for commands run with `exec`
    pub exec_timeout: Duration,

    /// Upper bound for individual host setup commands
    pub command_timeout: Duration,

    /// Init command for nodes that declare none
    pub default_init: String,
}

impl BackendConfig {
    /// Create a new backend configuration
    ///
    /// Sudo is enabled automatically when not running as root.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            namespace_prefix: "tn".to_string(),
            use_sudo: !EnvironmentDetector::is_root(),
            stop_grace: Duration::from_secs(5),
            launch_check: Duration::from_millis(300),
            exec_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(10),
            default_init: "sleep infinity".to_string(),
        }
    }

    pub fn with_namespace_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_launch_check(mut self, window: Duration) -> Self {
        self.launch_check = window;
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn with_default_init<C: Into<String>>(mut self, command: C) -> Self {
        self.default_init = command.into();
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

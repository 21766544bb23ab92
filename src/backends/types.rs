// ============================================================================
// File: src/backends/types.rs
// ----------------------------------------------------------------------------
// Node handles, exec results and health reports
// ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handle::LiveToken;

/// Name of a node's `index`-th interface inside its namespace.
pub fn interface_name(index: usize) -> String {
    format!("eth{index}")
}

/// Opaque reference to a live node.
///
/// Cloning a handle does not duplicate the resource; all clones share one
/// lifecycle token.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: Uuid,
    name: String,
    namespace: String,
    rootfs: Option<PathBuf>,
    init_pid: Option<u32>,
    created_at: DateTime<Utc>,
    token: LiveToken,
}

impl NodeHandle {
    pub fn new<N: Into<String>, S: Into<String>>(name: N, namespace: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            namespace: namespace.into(),
            rootfs: None,
            init_pid: None,
            created_at: Utc::now(),
            token: LiveToken::new(),
        }
    }

    pub fn with_rootfs(mut self, rootfs: Option<PathBuf>) -> Self {
        self.rootfs = rootfs;
        self
    }

    pub fn with_init_pid(mut self, pid: Option<u32>) -> Self {
        self.init_pid = pid;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network namespace (or simulated equivalent) backing this node
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn rootfs(&self) -> Option<&Path> {
        self.rootfs.as_deref()
    }

    pub fn init_pid(&self) -> Option<u32> {
        self.init_pid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> &LiveToken {
        &self.token
    }
}

/// Outcome of a command run inside a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code (0 = success, -1 = killed by signal)
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration: Duration,
}

impl ExecResult {
    pub fn success<O: Into<String>>(stdout: O) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn failure<E: Into<String>>(exit_code: i32, stderr: E) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Backend or fabric health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,

    /// Human-readable status message
    pub message: String,

    pub last_check: SystemTime,

    /// Component-specific details
    pub metrics: HashMap<String, String>,
}

impl HealthStatus {
    pub fn healthy<M: Into<String>>(message: M) -> Self {
        Self {
            is_healthy: true,
            message: message.into(),
            last_check: SystemTime::now(),
            metrics: HashMap::new(),
        }
    }

    pub fn unhealthy<M: Into<String>>(message: M) -> Self {
        Self {
            is_healthy: false,
            message: message.into(),
            last_check: SystemTime::now(),
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

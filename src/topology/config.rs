// ============================================================================
// File: src/topology/config.rs
// ----------------------------------------------------------------------------
// JSON declaration files for topologies
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::{LinkSpec, NodeSpec, SwitchSpec};

/// On-disk form of a topology.
///
/// ```json
/// {
///   "nodes":    [{ "name": "n1", "address": "10.0.0.1", "command": "/sbin/init" }],
///   "switches": [{ "name": "s1" }],
///   "links":    [{ "endpoints": ["n1", "s1"] }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub switches: Vec<SwitchSpec>,

    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// Errors loading a declaration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read topology file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse topology file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TopologyConfig {
    /// Read and parse a JSON topology file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// File: src/topology/types.rs
// ----------------------------------------------------------------------------
// Declarative entities of a topology: nodes, switches, links and addresses.
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::shaping::ShapingPolicy;

/// Index of a node in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Index of a switch in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SwitchId(pub usize);

/// Index of a link in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// An interface address with prefix length, e.g. `10.0.0.1/8`.
///
/// A bare address takes the emulator default prefix: `/8` for IPv4 and
/// `/64` for IPv6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    pub ip: IpAddr,
    pub prefix: u8,
}

impl NodeAddress {
    pub fn new(ip: IpAddr, prefix: u8) -> Result<Self, ValidationError> {
        let max = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(ValidationError::InvalidAddress {
                value: format!("{ip}/{prefix}"),
                reason: format!("prefix length exceeds {max}"),
            });
        }
        Ok(Self { ip, prefix })
    }

    fn default_prefix(ip: &IpAddr) -> u8 {
        match ip {
            IpAddr::V4(_) => 8,
            IpAddr::V6(_) => 64,
        }
    }
}

impl FromStr for NodeAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidAddress {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (ip_part, prefix_part) = match s.trim().split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (s.trim(), None),
        };
        let ip: IpAddr = ip_part.parse().map_err(|_| invalid("not an IP address"))?;
        let prefix = match prefix_part {
            Some(p) => p.parse::<u8>().map_err(|_| invalid("prefix is not a number"))?,
            None => Self::default_prefix(&ip),
        };
        Self::new(ip, prefix)
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

fn default_interfaces() -> u8 {
    1
}

/// A node declaration: one isolated execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique name across nodes and switches
    pub name: String,

    /// Address applied to the node's first interface
    #[serde(default)]
    pub address: Option<NodeAddress>,

    /// Startup command run as the node's init process
    #[serde(default)]
    pub command: Option<String>,

    /// Image reference resolved to a root filesystem
    #[serde(default)]
    pub image: Option<String>,

    /// Number of links this node can terminate
    #[serde(default = "default_interfaces")]
    pub interfaces: u8,
}

impl NodeSpec {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            address: None,
            command: None,
            image: None,
            interfaces: default_interfaces(),
        }
    }

    pub fn with_address(mut self, address: NodeAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_command<C: Into<String>>(mut self, command: C) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_image<I: Into<String>>(mut self, image: I) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_interfaces(mut self, interfaces: u8) -> Self {
        self.interfaces = interfaces;
        self
    }
}

/// A switch declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchSpec {
    pub name: String,
}

impl SwitchSpec {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into() }
    }
}

/// A link declaration between two named endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub endpoints: [String; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shaping: Option<ShapingPolicy>,
}

impl LinkSpec {
    pub fn new<A: Into<String>, B: Into<String>>(a: A, b: B) -> Self {
        Self {
            endpoints: [a.into(), b.into()],
            shaping: None,
        }
    }

    pub fn with_shaping(mut self, shaping: ShapingPolicy) -> Self {
        self.shaping = Some(shaping);
        self
    }

    /// `a--b`, used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{}--{}", self.endpoints[0], self.endpoints[1])
    }

    pub fn touches(&self, name: &str) -> bool {
        self.endpoints.iter().any(|e| e == name)
    }
}

/// What kind of entity a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Node,
    Switch,
}

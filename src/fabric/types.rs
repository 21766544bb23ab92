// ============================================================================
// File: src/fabric/types.rs
// ----------------------------------------------------------------------------
// Switch and link handles
// ============================================================================

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::backends::{NodeHandle, interface_name};
use crate::handle::LiveToken;
use crate::topology::ShapingPolicy;

/// Opaque reference to a live switch.
#[derive(Debug, Clone)]
pub struct SwitchHandle {
    id: Uuid,
    name: String,
    device: String,
    created_at: DateTime<Utc>,
    token: LiveToken,
}

impl SwitchHandle {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, device: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            device: device.into(),
            created_at: Utc::now(),
            token: LiveToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bridge device (or simulated equivalent) backing the switch
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> &LiveToken {
        &self.token
    }
}

/// One side of a link being connected.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// A node, on the given interface inside its namespace
    Node { handle: NodeHandle, interface: String },
    /// A switch port
    Switch(SwitchHandle),
}

impl Attachment {
    /// Attach to the node's `index`-th interface.
    pub fn node(handle: NodeHandle, index: usize) -> Self {
        Attachment::Node {
            handle,
            interface: interface_name(index),
        }
    }

    pub fn switch(handle: SwitchHandle) -> Self {
        Attachment::Switch(handle)
    }

    pub fn name(&self) -> &str {
        match self {
            Attachment::Node { handle, .. } => handle.name(),
            Attachment::Switch(handle) => handle.name(),
        }
    }

    pub fn token(&self) -> &LiveToken {
        match self {
            Attachment::Node { handle, .. } => handle.token(),
            Attachment::Switch(handle) => handle.token(),
        }
    }
}

/// Where one end of a realized link lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEnd {
    /// Node or switch name
    pub endpoint: String,
    /// Namespace holding the device; `None` for the host namespace
    pub namespace: Option<String>,
    pub device: String,
}

/// Opaque reference to a live link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    id: Uuid,
    label: String,
    ends: [LinkEnd; 2],
    shaping: Arc<RwLock<Option<ShapingPolicy>>>,
    created_at: DateTime<Utc>,
    token: LiveToken,
}

impl LinkHandle {
    pub fn new(ends: [LinkEnd; 2], shaping: Option<ShapingPolicy>) -> Self {
        let label = format!("{}--{}", ends[0].endpoint, ends[1].endpoint);
        Self {
            id: Uuid::new_v4(),
            label,
            ends,
            shaping: Arc::new(RwLock::new(shaping)),
            created_at: Utc::now(),
            token: LiveToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `a--b`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ends(&self) -> &[LinkEnd; 2] {
        &self.ends
    }

    /// Shaping currently installed on the link.
    pub fn shaping(&self) -> Option<ShapingPolicy> {
        self.shaping
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Record the policy a fabric just installed.
    pub fn set_shaping(&self, shaping: Option<ShapingPolicy>) {
        match self.shaping.write() {
            Ok(mut guard) => *guard = shaping,
            Err(poisoned) => *poisoned.into_inner() = shaping,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn token(&self) -> &LiveToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn end(endpoint: &str, device: &str) -> LinkEnd {
        LinkEnd {
            endpoint: endpoint.to_string(),
            namespace: None,
            device: device.to_string(),
        }
    }

    #[test]
    fn link_label_follows_ends() {
        let link = LinkHandle::new([end("s1", "a"), end("s2", "b")], None);
        assert_eq!(link.label(), "s1--s2");
        assert_eq!(link.shaping(), None);
    }

    #[test]
    fn shaping_updates_are_visible_to_clones() {
        let link = LinkHandle::new([end("n1", "eth0"), end("s1", "v0")], None);
        let clone = link.clone();
        let policy = ShapingPolicy::new().with_delay(Duration::from_millis(5));

        link.set_shaping(Some(policy.clone()));
        assert_eq!(clone.shaping(), Some(policy));
    }

    #[test]
    fn attachment_names() {
        let node = NodeHandle::new("n1", "tn-n1");
        let attachment = Attachment::node(node, 2);
        assert_eq!(attachment.name(), "n1");
        assert!(matches!(attachment, Attachment::Node { ref interface, .. } if interface == "eth2"));

        let switch = Attachment::switch(SwitchHandle::new("s1", "tnb0"));
        assert_eq!(switch.name(), "s1");
    }
}

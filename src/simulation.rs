// ============================================================================
// File: src/simulation.rs
// ----------------------------------------------------------------------------
// Shared state for the simulated backend and fabric: an ordered journal of
// every resource operation and a plan of injected faults.
// ============================================================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::topology::NodeAddress;

/// One resource operation performed by a simulated component.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEvent {
    NodeCreated(String),
    AddressAssigned { node: String, address: NodeAddress },
    Exec { node: String, command: Vec<String> },
    NodeDestroyed(String),
    SwitchCreated(String),
    SwitchRemoved(String),
    LinkConnected(String),
    LinkReshaped(String),
    LinkDisconnected(String),
}

impl JournalEvent {
    /// True for events that release a resource.
    pub fn is_release(&self) -> bool {
        matches!(
            self,
            JournalEvent::NodeDestroyed(_) | JournalEvent::SwitchRemoved(_) | JournalEvent::LinkDisconnected(_)
        )
    }

    /// True for events that bring a resource into existence.
    pub fn is_acquire(&self) -> bool {
        matches!(
            self,
            JournalEvent::NodeCreated(_) | JournalEvent::SwitchCreated(_) | JournalEvent::LinkConnected(_)
        )
    }

    /// Name of the node, switch or link label the event concerns.
    pub fn subject(&self) -> &str {
        match self {
            JournalEvent::NodeCreated(name)
            | JournalEvent::NodeDestroyed(name)
            | JournalEvent::SwitchCreated(name)
            | JournalEvent::SwitchRemoved(name)
            | JournalEvent::LinkConnected(name)
            | JournalEvent::LinkReshaped(name)
            | JournalEvent::LinkDisconnected(name) => name,
            JournalEvent::AddressAssigned { node, .. } | JournalEvent::Exec { node, .. } => node,
        }
    }
}

/// Ordered, shareable record of simulated operations.
///
/// A backend and a fabric constructed with clones of the same journal record
/// into one sequence, so tests can check global ordering.
#[derive(Debug, Clone, Default)]
pub struct SimulationJournal {
    events: Arc<Mutex<Vec<JournalEvent>>>,
}

impl SimulationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: JournalEvent) {
        self.lock().push(event);
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<JournalEvent> {
        self.lock().clone()
    }

    pub fn acquisitions(&self) -> Vec<JournalEvent> {
        self.lock().iter().filter(|e| e.is_acquire()).cloned().collect()
    }

    pub fn releases(&self) -> Vec<JournalEvent> {
        self.lock().iter().filter(|e| e.is_release()).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JournalEvent>> {
        // A panicking recorder cannot leave the Vec half-written.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Faults to inject into simulated operations.
///
/// Links are identified by their unordered endpoint pair.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    fail_create: HashSet<String>,
    fail_destroy: HashSet<String>,
    fail_switch: HashSet<String>,
    fail_switch_removal: HashSet<String>,
    fail_connect: HashSet<(String, String)>,
    fail_disconnect: HashSet<(String, String)>,
    create_delay: Duration,
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create<N: Into<String>>(mut self, node: N) -> Self {
        self.fail_create.insert(node.into());
        self
    }

    pub fn fail_destroy<N: Into<String>>(mut self, node: N) -> Self {
        self.fail_destroy.insert(node.into());
        self
    }

    pub fn fail_switch<N: Into<String>>(mut self, switch: N) -> Self {
        self.fail_switch.insert(switch.into());
        self
    }

    pub fn fail_switch_removal<N: Into<String>>(mut self, switch: N) -> Self {
        self.fail_switch_removal.insert(switch.into());
        self
    }

    pub fn fail_connect(mut self, a: &str, b: &str) -> Self {
        self.fail_connect.insert(pair(a, b));
        self
    }

    pub fn fail_disconnect(mut self, a: &str, b: &str) -> Self {
        self.fail_disconnect.insert(pair(a, b));
        self
    }

    /// Delay every node creation, widening the window for cancellation.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn create_fails(&self, node: &str) -> bool {
        self.fail_create.contains(node)
    }

    pub fn destroy_fails(&self, node: &str) -> bool {
        self.fail_destroy.contains(node)
    }

    pub fn switch_fails(&self, switch: &str) -> bool {
        self.fail_switch.contains(switch)
    }

    pub fn switch_removal_fails(&self, switch: &str) -> bool {
        self.fail_switch_removal.contains(switch)
    }

    pub fn connect_fails(&self, a: &str, b: &str) -> bool {
        self.fail_connect.contains(&pair(a, b))
    }

    pub fn disconnect_fails(&self, a: &str, b: &str) -> bool {
        self.fail_disconnect.contains(&pair(a, b))
    }

    pub fn create_delay(&self) -> Duration {
        self.create_delay
    }
}

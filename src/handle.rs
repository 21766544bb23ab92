// ============================================================================
// File: src/handle.rs
// ----------------------------------------------------------------------------
// Lifecycle token carried by every live node, switch and link handle.
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Whether the resource behind a handle still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Released,
}

/// Per-handle lifecycle lock.
///
/// Users of a resource (exec, reshape, connecting a link to it) hold shared
/// access for the duration of their call; releasing it takes exclusive access.
/// A release therefore waits for in-flight users, and any user arriving after
/// the release observes `Released`.
#[derive(Clone)]
pub struct LiveToken {
    state: Arc<RwLock<Liveness>>,
}

/// Shared access to a live resource.
pub type UseGuard = OwnedRwLockReadGuard<Liveness>;

/// Exclusive access held while a resource is being released.
pub struct ReleaseGuard {
    guard: OwnedRwLockWriteGuard<Liveness>,
}

impl ReleaseGuard {
    /// Record that the underlying resource is gone.
    pub fn complete(mut self) {
        *self.guard = Liveness::Released;
    }
}

impl LiveToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Liveness::Live)),
        }
    }

    /// Acquire shared access, or `None` if the resource was already released.
    pub async fn acquire(&self) -> Option<UseGuard> {
        let guard = self.state.clone().read_owned().await;
        match *guard {
            Liveness::Live => Some(guard),
            Liveness::Released => None,
        }
    }

    /// Acquire exclusive access for release, or `None` if already released.
    ///
    /// Dropping the guard without calling [`ReleaseGuard::complete`] leaves
    /// the resource live, so a failed release can be retried.
    pub async fn begin_release(&self) -> Option<ReleaseGuard> {
        let guard = self.state.clone().write_owned().await;
        match *guard {
            Liveness::Live => Some(ReleaseGuard { guard }),
            Liveness::Released => None,
        }
    }

    pub async fn liveness(&self) -> Liveness {
        *self.state.read().await
    }

    pub async fn is_live(&self) -> bool {
        self.liveness().await == Liveness::Live
    }
}

impl Default for LiveToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LiveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.try_read() {
            Ok(guard) => format!("{:?}", *guard),
            Err(_) => "Busy".to_string(),
        };
        f.debug_struct("LiveToken").field("state", &state).finish()
    }
}

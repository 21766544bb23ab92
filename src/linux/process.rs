// ============================================================================
// File: src/linux/process.rs
// ----------------------------------------------------------------------------
// Process-group signalling and graceful termination of node init processes.
// ============================================================================

use std::time::Duration;

use log::{debug, warn};
use tokio::process::Child;

use super::{PrivilegeManager, SysError, SysResult};

/// Signals used to stop a node's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Terminate,
    Kill,
}

impl StopSignal {
    fn name(self) -> &'static str {
        match self {
            StopSignal::Terminate => "TERM",
            StopSignal::Kill => "KILL",
        }
    }
}

/// How a process group ended up stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Had already exited before we signalled it
    AlreadyExited,
    /// Exited within the grace period after SIGTERM
    Graceful,
    /// Needed SIGKILL
    Forced,
}

/// Deliver `signal` to every process in group `pgid`.
///
/// A group that no longer exists is not an error.
pub async fn signal_group(privilege: &PrivilegeManager, pgid: u32, signal: StopSignal) -> SysResult<()> {
    if privilege.uses_sudo() {
        let group = format!("-{pgid}");
        return privilege
            .run_idempotent(&["kill", "-s", signal.name(), "--", &group])
            .await;
    }
    signal_group_direct(pgid, signal)
}

#[cfg(target_os = "linux")]
fn signal_group_direct(pgid: u32, signal: StopSignal) -> SysResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pgid).map_err(|_| SysError::Signal {
        pgid,
        details: "pid out of range".to_string(),
    })?;
    let sig = match signal {
        StopSignal::Terminate => Signal::SIGTERM,
        StopSignal::Kill => Signal::SIGKILL,
    };

    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(SysError::Signal {
            pgid,
            details: e.to_string(),
        }),
    }
}

#[cfg(not(target_os = "linux"))]
fn signal_group_direct(pgid: u32, _signal: StopSignal) -> SysResult<()> {
    Err(SysError::Signal {
        pgid,
        details: "process groups are only managed on Linux".to_string(),
    })
}

/// Stop a child that leads its own process group.
///
/// Sends SIGTERM to the group, waits up to `grace`, then escalates to SIGKILL
/// and reaps the child.
pub async fn terminate_with_grace(
    child: &mut Child,
    privilege: &PrivilegeManager,
    grace: Duration,
) -> SysResult<StopOutcome> {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("process already exited with {}", status);
        return Ok(StopOutcome::AlreadyExited);
    }
    let Some(pgid) = child.id() else {
        return Ok(StopOutcome::AlreadyExited);
    };

    signal_group(privilege, pgid, StopSignal::Terminate).await?;
    if let Ok(wait) = tokio::time::timeout(grace, child.wait()).await {
        if let Err(e) = wait {
            warn!("wait on process group {} failed: {}", pgid, e);
        }
        return Ok(StopOutcome::Graceful);
    }

    warn!(
        "process group {} ignored SIGTERM for {:?}, sending SIGKILL",
        pgid, grace
    );
    signal_group(privilege, pgid, StopSignal::Kill).await?;
    // SIGKILL cannot be ignored; a bounded wait only guards against a stuck
    // sudo wrapper.
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => Ok(StopOutcome::Forced),
        Err(_) => {
            child.start_kill().map_err(|e| SysError::Signal {
                pgid,
                details: e.to_string(),
            })?;
            let _ = child.wait().await;
            Ok(StopOutcome::Forced)
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_group(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .process_group(0)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sh")
    }

    #[tokio::test]
    async fn cooperative_process_stops_gracefully() {
        let mut child = spawn_group("sleep 30");
        let outcome = terminate_with_grace(&mut child, &PrivilegeManager::default(), Duration::from_secs(2))
            .await
            .expect("terminate");
        assert_eq!(outcome, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn stubborn_process_is_killed_after_grace() {
        let mut child = spawn_group("trap '' TERM; while true; do sleep 0.05; done");
        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = terminate_with_grace(&mut child, &PrivilegeManager::default(), Duration::from_millis(200))
            .await
            .expect("terminate");
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(child.try_wait().expect("try_wait").is_some());
    }

    #[tokio::test]
    async fn exited_process_needs_no_signal() {
        let mut child = spawn_group("exit 0");
        let _ = child.wait().await;
        let outcome = terminate_with_grace(&mut child, &PrivilegeManager::default(), Duration::from_millis(100))
            .await
            .expect("terminate");
        assert_eq!(outcome, StopOutcome::AlreadyExited);
    }
}

// ============================================================================
// File: src/backends/netns/launch.rs
// ----------------------------------------------------------------------------
// Process plumbing for namespace-backed nodes.
//
// Provides:
// - Init process launch inside a fresh PID namespace
// - Bounded command execution with process-group kill on timeout
// - Sweeping leftover processes out of a namespace
// ============================================================================

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::process::Child;

use crate::backends::errors::{BackendError, BackendResult};
use crate::backends::types::ExecResult;
use crate::linux::{PrivilegeManager, StopSignal, SysError, SysResult, signal_group};

/// Spawn `command` as the init process of `namespace`.
///
/// The init runs in its own PID namespace (so killing it takes every
/// descendant with it) and leads a fresh process group on the host side.
pub(super) fn spawn_init(
    privilege: &PrivilegeManager,
    namespace: &str,
    rootfs: Option<&Path>,
    command: &str,
) -> SysResult<Child> {
    let mut cmd = privilege.command("ip");
    cmd.args(["netns", "exec", namespace, "unshare", "--pid", "--fork", "--kill-child", "--mount-proc"]);
    if let Some(root) = rootfs {
        cmd.arg(format!("--root={}", root.display()));
    }
    cmd.args(["/bin/sh", "-c", command])
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    debug!("launching init in {}: {}", namespace, command);
    cmd.spawn().map_err(|e| SysError::Spawn {
        command: format!("ip netns exec {namespace} unshare ... {command}"),
        details: e.to_string(),
    })
}

/// Wait `window` for an early exit of a freshly spawned init.
///
/// Returns the failure description if the init died inside the window.
pub(super) async fn check_started(child: &mut Child, window: Duration) -> Option<String> {
    match tokio::time::timeout(window, child.wait()).await {
        Err(_) => None,
        Ok(Err(e)) => Some(format!("failed to observe init process: {e}")),
        Ok(Ok(status)) => Some(format!("init exited during startup with {status}")),
    }
}

/// Run `command` inside `namespace`, killing its process group on timeout.
pub(super) async fn run_in_namespace(
    privilege: &PrivilegeManager,
    node: &str,
    namespace: &str,
    rootfs: Option<&Path>,
    command: &[String],
    timeout: Duration,
) -> BackendResult<ExecResult> {
    if command.is_empty() {
        return Err(BackendError::ExecFailed {
            node: node.to_string(),
            details: "empty command".to_string(),
        });
    }

    let mut cmd = privilege.command("ip");
    cmd.args(["netns", "exec", namespace]);
    if let Some(root) = rootfs {
        cmd.arg("chroot").arg(root);
    }
    cmd.args(command)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let child = cmd.spawn().map_err(|e| BackendError::ExecFailed {
        node: node.to_string(),
        details: format!("failed to spawn: {e}"),
    })?;
    let pgid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        }),
        Ok(Err(e)) => Err(BackendError::ExecFailed {
            node: node.to_string(),
            details: e.to_string(),
        }),
        Err(_) => {
            // The direct child was killed on drop; take its group with it.
            if let Some(pgid) = pgid
                && let Err(e) = signal_group(privilege, pgid, StopSignal::Kill).await
            {
                warn!("Failed to kill timed out command group in {}: {}", node, e);
            }
            Err(BackendError::ExecTimeout {
                node: node.to_string(),
                seconds: timeout.as_secs(),
            })
        }
    }
}

/// SIGKILL every process still attached to `namespace`.
pub(super) async fn sweep_namespace(privilege: &PrivilegeManager, namespace: &str) -> SysResult<usize> {
    let output = privilege.run_checked(&["ip", "netns", "pids", namespace]).await;
    let output = match output {
        Ok(output) => output,
        Err(e) if e.is_not_found() => return Ok(0),
        Err(e) => return Err(e),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pids: Vec<&str> = stdout.split_whitespace().collect();
    for pid in &pids {
        privilege.run_idempotent(&["kill", "-s", "KILL", pid]).await?;
    }
    if !pids.is_empty() {
        warn!("killed {} leftover processes in {}", pids.len(), namespace);
    }
    Ok(pids.len())
}

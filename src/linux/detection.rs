// ============================================================================
// File: src/linux/detection.rs
// ----------------------------------------------------------------------------
// Host capability checks: privileges, tools and namespace support.
// ============================================================================

use std::process::{Command, Stdio};

use log::{debug, info};

use super::PrivilegeManager;

/// Availability of one host tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: &'static str,
    pub available: bool,
}

/// Host capability checks.
pub struct EnvironmentDetector;

impl EnvironmentDetector {
    /// True if the effective user is root.
    #[cfg(target_os = "linux")]
    pub fn is_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(target_os = "linux"))]
    pub fn is_root() -> bool {
        false
    }

    /// True if `sudo -n true` succeeds.
    pub fn has_passwordless_sudo() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// True if `name` resolves on PATH.
    pub fn tool_available(name: &str) -> bool {
        let found = Command::new("sh")
            .args(["-c", &format!("command -v {name}")])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        debug!("tool {} available: {}", name, found);
        found
    }

    pub fn tools(names: &[&'static str]) -> Vec<ToolStatus> {
        names
            .iter()
            .map(|name| ToolStatus {
                name,
                available: Self::tool_available(name),
            })
            .collect()
    }

    /// Check whether network namespaces can actually be created here.
    ///
    /// Containers without CAP_SYS_ADMIN have `ip` but cannot add namespaces,
    /// so this creates and deletes a throwaway namespace.
    pub async fn netns_supported(privilege: &PrivilegeManager) -> bool {
        if !cfg!(target_os = "linux") || !Self::tool_available("ip") {
            return false;
        }
        if privilege.uses_sudo() && !Self::has_passwordless_sudo() {
            return false;
        }

        let scratch = format!("toponet-check-{}", std::process::id());
        let created = privilege
            .run_checked(&["ip", "netns", "add", &scratch])
            .await
            .is_ok();
        if created {
            let _ = privilege.run_idempotent(&["ip", "netns", "del", &scratch]).await;
        }
        info!("network namespace support: {}", created);
        created
    }
}

// ============================================================================
// File: src/linux/privilege.rs
// ----------------------------------------------------------------------------
// Host command execution, directly or through non-interactive sudo,
// with a per-command timeout.
// ============================================================================

use std::process::{Output, Stdio};
use std::time::Duration;

use log::debug;
use tokio::process::Command;

use super::{SysError, SysResult};

/// Builds and runs host commands, optionally through non-interactive sudo.
#[derive(Debug, Clone)]
pub struct PrivilegeManager {
    use_sudo: bool,
    timeout: Duration,
}

impl PrivilegeManager {
    pub fn new(use_sudo: bool, timeout: Duration) -> Self {
        Self { use_sudo, timeout }
    }

    pub fn uses_sudo(&self) -> bool {
        self.use_sudo
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A command for `program`, prefixed with `sudo -n` when configured.
    ///
    /// The child is killed if the returned command's handle is dropped.
    pub fn command(&self, program: &str) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run `args[0] args[1..]` and return its raw output.
    pub async fn output(&self, args: &[&str]) -> SysResult<Output> {
        let Some((program, rest)) = args.split_first() else {
            return Err(SysError::Spawn {
                command: String::new(),
                details: "empty command line".to_string(),
            });
        };
        let line = self.render(args);
        debug!("run: {}", line);

        let mut cmd = self.command(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SysError::Spawn {
                command: line,
                details: e.to_string(),
            }),
            Err(_) => Err(SysError::Timeout {
                command: line,
                timeout: self.timeout,
            }),
        }
    }

    /// Run a command and fail with its stderr if it exits non-zero.
    pub async fn run_checked(&self, args: &[&str]) -> SysResult<Output> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(SysError::Failed {
                command: self.render(args),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Like [`run_checked`](Self::run_checked), but an already-missing object
    /// counts as success.
    pub async fn run_idempotent(&self, args: &[&str]) -> SysResult<()> {
        match self.run_checked(args).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("already gone: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn render(&self, args: &[&str]) -> String {
        if self.use_sudo {
            format!("sudo -n {}", args.join(" "))
        } else {
            args.join(" ")
        }
    }
}

impl Default for PrivilegeManager {
    fn default() -> Self {
        Self::new(false, Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_output() {
        let privilege = PrivilegeManager::default();
        let output = privilege
            .run_checked(&["sh", "-c", "echo hello"])
            .await
            .expect("sh should run");
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let privilege = PrivilegeManager::default();
        let err = privilege
            .run_checked(&["sh", "-c", "echo 'Cannot find device \"x\"' >&2; exit 1"])
            .await
            .expect_err("non-zero exit");

        assert!(matches!(err, SysError::Failed { .. }));
        assert!(err.is_not_found());
        assert!(privilege
            .run_idempotent(&["sh", "-c", "echo 'Cannot find device' >&2; exit 1"])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let privilege = PrivilegeManager::new(false, Duration::from_millis(50));
        let err = privilege
            .output(&["sleep", "5"])
            .await
            .expect_err("should time out");
        assert!(matches!(err, SysError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let privilege = PrivilegeManager::default();
        let err = privilege
            .output(&["definitely-not-a-real-binary-xyz"])
            .await
            .expect_err("no such program");
        assert!(matches!(err, SysError::Spawn { .. }));
    }
}

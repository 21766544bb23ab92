// ============================================================================
// File: src/linux/mod.rs
// ----------------------------------------------------------------------------
// Host command plumbing for the namespace-backed backend and fabric.
//
// Everything that shells out to ip, tc, unshare or kill goes through
// PrivilegeManager so that sudo usage, timeouts and error reporting are
// uniform.
// ============================================================================

use std::time::Duration;

mod detection;
mod privilege;
mod process;

pub use detection::{EnvironmentDetector, ToolStatus};
pub use privilege::PrivilegeManager;
pub use process::{StopOutcome, StopSignal, signal_group, terminate_with_grace};

/// Errors from running host commands
#[derive(Debug, Clone, thiserror::Error)]
pub enum SysError {
    /// The program could not be started at all
    #[error("Failed to spawn `{command}`: {details}")]
    Spawn { command: String, details: String },

    /// The program ran and exited non-zero
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The program did not finish in time and was killed
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Signal delivery failed
    #[error("Failed to signal process group {pgid}: {details}")]
    Signal { pgid: u32, details: String },
}

impl SysError {
    /// True if stderr says the object is already gone.
    ///
    /// `ip` and `tc` report missing devices and namespaces with these
    /// phrases; releases treat them as success.
    pub fn is_not_found(&self) -> bool {
        match self {
            SysError::Failed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("cannot find device")
                    || stderr.contains("no such file or directory")
                    || stderr.contains("does not exist")
                    || stderr.contains("no such process")
            }
            _ => false,
        }
    }
}

/// Result type for host command operations
pub type SysResult<T> = Result<T, SysError>;

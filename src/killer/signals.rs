// Signal delivery for worker termination

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Result of a termination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillResult {
    /// Signal was delivered
    Success,
    /// Process had already exited
    AlreadyDead,
    /// Permission denied (typically need root or a shared pid namespace)
    PermissionDenied,
    /// Other error occurred
    Error(String),
}

impl KillResult {
    /// Whether the process is gone or on its way out
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyDead)
    }

    /// Get a human-readable description
    pub fn description(&self) -> &str {
        match self {
            Self::Success => "signal delivered",
            Self::AlreadyDead => "already dead",
            Self::PermissionDenied => "permission denied",
            Self::Error(msg) => msg,
        }
    }
}

/// Send a signal to a process
fn send_signal(pid: i32, signal: Signal) -> KillResult {
    match signal::kill(Pid::from_raw(pid), signal) {
        Ok(()) => KillResult::Success,
        Err(Errno::ESRCH) => KillResult::AlreadyDead,
        Err(Errno::EPERM) => KillResult::PermissionDenied,
        Err(e) => KillResult::Error(format!("signal error: {e}")),
    }
}

/// Request a graceful shutdown with SIGTERM
pub fn send_terminate(pid: i32) -> KillResult {
    log::debug!("Sending SIGTERM to process {pid}");
    send_signal(pid, Signal::SIGTERM)
}

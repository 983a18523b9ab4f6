// Worker selection and termination

mod matcher;
pub mod signals;

pub use matcher::{filter, matches_all, pgrep, sort_by_create_time, Matcher};
pub use signals::KillResult;

use crate::monitor::ProcessSource;
use anyhow::{bail, Result};

/// Ask `pid` to shut down gracefully.
///
/// A process that already exited counts as terminated; any other delivery
/// failure is returned.
pub fn terminate<S: ProcessSource + ?Sized>(source: &S, pid: i32) -> Result<()> {
    let result = source.terminate(pid);
    if result.is_success() {
        if result == KillResult::AlreadyDead {
            log::debug!("Process {pid} already exited");
        }
        Ok(())
    } else {
        bail!("Failed to terminate process {pid}: {}", result.description())
    }
}

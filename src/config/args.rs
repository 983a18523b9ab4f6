// Command-line argument parsing for the memory-events monitor

use super::{DEFAULT_CGROUP_MOUNT_POINT, DEFAULT_PROC_MOUNT_POINT};
use clap::Parser;
use std::path::PathBuf;

/// memory-events - OOM-kill monitor for a memory cgroup
///
/// Resolves the memory cgroup of a process and reports the cumulative number
/// of OOM kills inside it until interrupted.
#[derive(Parser, Debug)]
#[command(name = "memory-events")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Report OOM kills in the memory cgroup of a process", long_about = None)]
pub struct MonitorArgs {
    /// cgroup PID to monitor
    #[arg(long = "pid", value_name = "PID", default_value_t = 1)]
    pub pid: i32,

    /// Where the cgroup hierarchy is mounted
    #[arg(long = "cgroup-mount-point", value_name = "PATH", default_value = DEFAULT_CGROUP_MOUNT_POINT)]
    pub cgroup_mount_point: PathBuf,

    /// Where procfs is mounted
    #[arg(long = "proc-mount-point", value_name = "PATH", default_value = DEFAULT_PROC_MOUNT_POINT)]
    pub proc_mount_point: PathBuf,
}

impl MonitorArgs {
    /// Parse arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        MonitorArgs::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = MonitorArgs::try_parse_from(["memory-events"]).unwrap();
        assert_eq!(args.pid, 1);
        assert_eq!(args.cgroup_mount_point, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(args.proc_mount_point, PathBuf::from("/proc"));
    }

    #[test]
    fn test_explicit_values() {
        let args = MonitorArgs::try_parse_from([
            "memory-events",
            "--pid",
            "4242",
            "--cgroup-mount-point",
            "/host/cgroup",
        ])
        .unwrap();
        assert_eq!(args.pid, 4242);
        assert_eq!(args.cgroup_mount_point, PathBuf::from("/host/cgroup"));
    }

    #[test]
    fn test_rejects_non_numeric_pid() {
        assert!(MonitorArgs::try_parse_from(["memory-events", "--pid", "init"]).is_err());
    }
}

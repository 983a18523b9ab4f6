// Process enumeration and lazy attribute reads

use crate::killer::signals::{send_terminate, KillResult};
use anyhow::{Context, Result};
use procfs::process::Process;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Per-pid view of the process table.
///
/// Every read goes to the source again; a process that exits between two
/// reads simply makes the later read fail.
pub trait ProcessSource {
    /// All pids currently visible
    fn pids(&self) -> Result<Vec<i32>>;
    fn name(&self, pid: i32) -> Result<String>;
    fn cmdline(&self, pid: i32) -> Result<String>;
    fn parent_pid(&self, pid: i32) -> Result<i32>;
    /// Start time in clock ticks after boot
    fn start_time(&self, pid: i32) -> Result<u64>;
    /// Resident and virtual size in bytes
    fn memory(&self, pid: i32) -> Result<(u64, u64)>;
    /// Ask the process to shut down gracefully
    fn terminate(&self, pid: i32) -> KillResult;
}

/// Process source reading a procfs mount
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn process(&self, pid: i32) -> Result<Process> {
        Process::new_with_root(self.root.join(pid.to_string()))
            .with_context(|| format!("Failed to open process {pid}"))
    }
}

impl ProcessSource for ProcFs {
    // Only directory names are listed; attributes stay unread until needed.
    fn pids(&self) -> Result<Vec<i32>> {
        let mut pids = Vec::new();

        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        for entry in entries {
            let entry = entry?;
            if let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() {
                pids.push(pid);
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }

    fn name(&self, pid: i32) -> Result<String> {
        Ok(self.process(pid)?.stat()?.comm)
    }

    fn cmdline(&self, pid: i32) -> Result<String> {
        Ok(self.process(pid)?.cmdline()?.join(" "))
    }

    fn parent_pid(&self, pid: i32) -> Result<i32> {
        Ok(self.process(pid)?.stat()?.ppid)
    }

    fn start_time(&self, pid: i32) -> Result<u64> {
        Ok(self.process(pid)?.stat()?.starttime)
    }

    fn memory(&self, pid: i32) -> Result<(u64, u64)> {
        let stat = self.process(pid)?.stat()?;
        Ok((stat.rss.saturating_mul(procfs::page_size()), stat.vsize))
    }

    fn terminate(&self, pid: i32) -> KillResult {
        send_terminate(pid)
    }
}

/// Snapshot of a process for logging and reporting.
///
/// Attributes that could not be read are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: Option<String>,
    pub cmdline: Option<String>,
    pub start_time: Option<u64>,
    pub rss: Option<u64>,
    pub vms: Option<u64>,
    pub parent: Option<Box<ProcessInfo>>,
}

impl ProcessInfo {
    /// Read a process and its parent
    pub fn read<S: ProcessSource + ?Sized>(source: &S, pid: i32) -> Self {
        let mut info = Self::read_single(source, pid);
        if let Ok(ppid) = source.parent_pid(pid) {
            info.parent = Some(Box::new(Self::read_single(source, ppid)));
        }
        info
    }

    /// Read a process without its parent
    pub fn read_single<S: ProcessSource + ?Sized>(source: &S, pid: i32) -> Self {
        let (rss, vms) = source.memory(pid).ok().unzip();
        Self {
            pid,
            name: source.name(pid).ok(),
            cmdline: source.cmdline(pid).ok(),
            start_time: source.start_time(pid).ok(),
            rss,
            vms,
            parent: None,
        }
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID {}", self.pid)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        if let Some(cmdline) = self.cmdline.as_deref().filter(|c| !c.is_empty()) {
            write!(f, " {cmdline:?}")?;
        }
        if let Some(start_time) = self.start_time {
            write!(f, ", started at tick {start_time}")?;
        }
        if let Some(rss) = self.rss {
            write!(f, ", RSS {} KiB", rss / 1024)?;
        }
        if let Some(vms) = self.vms {
            write!(f, ", VMS {} KiB", vms / 1024)?;
        }
        if let Some(parent) = &self.parent {
            write!(f, ", parent [{parent}]")?;
        }
        Ok(())
    }
}

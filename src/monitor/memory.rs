// Effective memory of a process: the tighter of system and cgroup bounds

use super::cgroup::{CgroupMemory, CgroupResolver, ProcCgroupResolver};
use super::meminfo::SystemMemory;
use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

/// Point-in-time memory figures, in bytes.
///
/// `available` never exceeds `total`. A zero `total` means the figures are
/// unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    total: u64,
    available: u64,
}

impl MemoryInfo {
    pub fn new(total: u64, available: u64) -> Self {
        Self {
            total,
            available: available.min(total),
        }
    }

    pub const fn total(&self) -> u64 {
        self.total
    }

    pub const fn available(&self) -> u64 {
        self.available
    }

    /// Percentage of available memory, truncated toward zero.
    ///
    /// Unknown or overflowing figures report 100 (no pressure).
    pub fn available_percent(&self) -> u32 {
        if self.total == 0 || self.available >= self.total {
            return 100;
        }
        (self.available as f64 / self.total as f64 * 100.0) as u32
    }

    /// Format a byte count in human-readable form
    pub fn format_size(bytes: u64) -> String {
        const KIB: u64 = 1024;
        const MIB: u64 = KIB * 1024;
        const GIB: u64 = MIB * 1024;

        if bytes == u64::MAX {
            "unbounded".to_string()
        } else if bytes >= GIB {
            format!("{:.2} GiB", bytes as f64 / GIB as f64)
        } else if bytes >= MIB {
            format!("{:.2} MiB", bytes as f64 / MIB as f64)
        } else if bytes >= KIB {
            format!("{:.2} KiB", bytes as f64 / KIB as f64)
        } else {
            format!("{bytes} B")
        }
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory: {}/{} available ({}%)",
            Self::format_size(self.available),
            Self::format_size(self.total),
            self.available_percent(),
        )
    }
}

/// Reads system and cgroup memory below configurable mount roots
#[derive(Debug)]
pub struct MemoryAccountant<R = ProcCgroupResolver> {
    proc_root: PathBuf,
    cgroup_root: PathBuf,
    resolver: R,
}

impl MemoryAccountant<ProcCgroupResolver> {
    /// Accountant resolving cgroups through `<proc_root>/<pid>/cgroup`
    pub fn new(proc_root: impl Into<PathBuf>, cgroup_root: impl Into<PathBuf>) -> Self {
        let proc_root = proc_root.into();
        let cgroup_root = cgroup_root.into();
        let resolver = ProcCgroupResolver::new(proc_root.clone(), cgroup_root.clone());
        Self::with_resolver(proc_root, cgroup_root, resolver)
    }
}

impl<R: CgroupResolver> MemoryAccountant<R> {
    pub fn with_resolver(
        proc_root: impl Into<PathBuf>,
        cgroup_root: impl Into<PathBuf>,
        resolver: R,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            cgroup_root: cgroup_root.into(),
            resolver,
        }
    }

    pub fn system_memory(&self) -> Result<SystemMemory> {
        SystemMemory::read(&self.proc_root)
    }

    pub fn cgroup_memory(&self, pid: i32) -> Result<CgroupMemory> {
        CgroupMemory::read(&self.resolver, &self.cgroup_root, pid)
    }

    /// Memory visible to `pid`, degrading to system-only or zero figures
    /// when a source cannot be read.
    pub fn memory_info(&self, pid: i32) -> MemoryInfo {
        let system = match self.system_memory() {
            Ok(system) => system,
            Err(e) => {
                let info = MemoryInfo::default();
                log::error!("Failed to read system memory: {e:#}, using default {info}");
                return info;
            }
        };
        let info = MemoryInfo::new(system.total, system.available);

        match self.cgroup_memory(pid) {
            Ok(cgroup) => MemoryInfo::new(
                system.total.min(cgroup.limit),
                system.available.min(cgroup.available),
            ),
            Err(e) => {
                log::error!("Failed to read cgroup memory: {e:#}, using system {info}");
                info
            }
        }
    }
}

// Cgroup hierarchy detection, path resolution and memory accounting
//
// Kernel docs: Documentation/admin-guide/cgroup-v1/memory.rst and
// Documentation/admin-guide/cgroup-v2.rst

use anyhow::{anyhow, Context, Result};
use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the legacy memory controller hierarchy
pub const MEMORY_SUBSYSTEM: &str = "memory";

const V1_LIMIT_FILE: &str = "memory.limit_in_bytes";
const V1_USAGE_FILE: &str = "memory.usage_in_bytes";
const V2_LIMIT_FILE: &str = "memory.max";
const V2_USAGE_FILE: &str = "memory.current";

/// Cgroup hierarchy layout of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupMode {
    /// cgroup v2, single unified hierarchy
    Unified,
    /// cgroup v1 (or hybrid), one hierarchy per controller
    Legacy,
}

impl fmt::Display for CgroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unified => write!(f, "unified"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Resolves which cgroup owns a process.
///
/// Returned paths are relative to the hierarchy root, in the form the kernel
/// prints them in `/proc/<pid>/cgroup` (leading `/`).
pub trait CgroupResolver {
    fn mode(&self) -> CgroupMode;
    fn unified_path(&self, pid: i32) -> Result<String>;
    fn legacy_path(&self, pid: i32, subsystem: &str) -> Result<String>;
}

/// Resolver backed by `<proc root>/<pid>/cgroup`
#[derive(Debug)]
pub struct ProcCgroupResolver {
    proc_root: PathBuf,
    cgroup_root: PathBuf,
    mode: OnceLock<CgroupMode>,
}

impl ProcCgroupResolver {
    /// Create a resolver that detects the hierarchy mode on first use
    pub fn new(proc_root: impl Into<PathBuf>, cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cgroup_root: cgroup_root.into(),
            mode: OnceLock::new(),
        }
    }

    /// Create a resolver with a fixed hierarchy mode
    pub fn with_mode(
        proc_root: impl Into<PathBuf>,
        cgroup_root: impl Into<PathBuf>,
        mode: CgroupMode,
    ) -> Self {
        let resolver = Self::new(proc_root, cgroup_root);
        let _ = resolver.mode.set(mode);
        resolver
    }

    fn read_proc_cgroup(&self, pid: i32) -> Result<String> {
        let path = self.proc_root.join(pid.to_string()).join("cgroup");
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

impl CgroupResolver for ProcCgroupResolver {
    fn mode(&self) -> CgroupMode {
        *self.mode.get_or_init(|| detect_mode(&self.cgroup_root))
    }

    fn unified_path(&self, pid: i32) -> Result<String> {
        let content = self.read_proc_cgroup(pid)?;
        parse_unified_path(&content)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No unified cgroup entry for pid {pid}"))
    }

    fn legacy_path(&self, pid: i32, subsystem: &str) -> Result<String> {
        let content = self.read_proc_cgroup(pid)?;
        parse_legacy_path(&content, subsystem)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No {subsystem} cgroup entry for pid {pid}"))
    }
}

/// Detect the hierarchy mode from the filesystem mounted at `cgroup_root`.
///
/// Anything that is not a cgroup2 mount, including hybrid setups, is treated
/// as legacy.
pub fn detect_mode(cgroup_root: &Path) -> CgroupMode {
    match statfs(cgroup_root) {
        Ok(stat) if stat.filesystem_type() == CGROUP2_SUPER_MAGIC => CgroupMode::Unified,
        Ok(_) => CgroupMode::Legacy,
        Err(e) => {
            log::warn!(
                "Failed to stat cgroup mount {}: {}, assuming legacy hierarchy",
                cgroup_root.display(),
                e
            );
            CgroupMode::Legacy
        }
    }
}

/// Extract the `0::<path>` entry from `/proc/<pid>/cgroup` content
fn parse_unified_path(content: &str) -> Option<&str> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("0::"))
}

/// Extract the path of the hierarchy carrying `subsystem`
fn parse_legacy_path<'a>(content: &'a str, subsystem: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let mut parts = line.trim().splitn(3, ':');
        let _hierarchy = parts.next()?;
        let controllers = parts.next()?;
        let path = parts.next()?;
        controllers
            .split(',')
            .any(|c| c == subsystem)
            .then_some(path)
    })
}

/// Join a kernel-style absolute cgroup path below a mount directory
fn join_relative(base: &Path, cgroup_path: &str) -> PathBuf {
    base.join(cgroup_path.trim_start_matches('/'))
}

/// Resolve the memory cgroup directory owning `pid`.
///
/// On legacy hierarchies a per-pid path that does not exist on disk (the
/// process lives in a cgroup namespace) falls back to the memory root.
pub fn memory_cgroup_dir<R: CgroupResolver + ?Sized>(
    resolver: &R,
    cgroup_root: &Path,
    pid: i32,
) -> Result<(CgroupMode, PathBuf)> {
    let mode = resolver.mode();
    let dir = match mode {
        CgroupMode::Unified => join_relative(cgroup_root, &resolver.unified_path(pid)?),
        CgroupMode::Legacy => {
            let memory_root = cgroup_root.join(MEMORY_SUBSYSTEM);
            let dir = join_relative(&memory_root, &resolver.legacy_path(pid, MEMORY_SUBSYSTEM)?);
            if dir.exists() {
                dir
            } else {
                log::debug!(
                    "Cgroup path {} does not exist, using root {}",
                    dir.display(),
                    memory_root.display()
                );
                memory_root
            }
        }
    };
    Ok((mode, dir))
}

/// Parse a cgroup memory value; `max` means unbounded
pub fn parse_cgroup_value(value: &str) -> Result<u64> {
    let value = value.trim();
    if value == "max" {
        return Ok(u64::MAX);
    }
    value
        .parse()
        .with_context(|| format!("Invalid cgroup value {value:?}"))
}

fn read_cgroup_value(path: &Path) -> Result<u64> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_cgroup_value(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Memory limit and headroom of a cgroup, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgroupMemory {
    pub limit: u64,
    pub available: u64,
}

impl CgroupMemory {
    /// Read the limit and usage of the memory cgroup owning `pid`
    pub fn read<R: CgroupResolver + ?Sized>(
        resolver: &R,
        cgroup_root: &Path,
        pid: i32,
    ) -> Result<Self> {
        let (mode, dir) = memory_cgroup_dir(resolver, cgroup_root, pid)?;
        let (limit_file, usage_file) = match mode {
            CgroupMode::Unified => (V2_LIMIT_FILE, V2_USAGE_FILE),
            CgroupMode::Legacy => (V1_LIMIT_FILE, V1_USAGE_FILE),
        };

        let limit = read_cgroup_value(&dir.join(limit_file))?;
        let usage = read_cgroup_value(&dir.join(usage_file))?;

        // Usage may temporarily exceed the limit.
        Ok(Self {
            limit,
            available: limit.saturating_sub(usage),
        })
    }
}

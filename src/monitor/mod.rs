// Memory, cgroup and process observation

pub mod cgroup;
mod meminfo;
mod memory;
pub mod oom;
pub mod process;

pub use cgroup::{CgroupMode, CgroupResolver, ProcCgroupResolver};
pub use meminfo::SystemMemory;
pub use memory::{MemoryAccountant, MemoryInfo};
pub use process::{ProcFs, ProcessInfo, ProcessSource};

// system-info - print every visible process and the memory of this one

use anyhow::Result;
use nginx_reaper::config::{
    init_logger, LogLevel, DEFAULT_CGROUP_MOUNT_POINT, DEFAULT_PROC_MOUNT_POINT,
};
use nginx_reaper::monitor::{MemoryAccountant, ProcFs, ProcessInfo, ProcessSource};
use std::process;

fn run() -> Result<()> {
    let source = ProcFs::new(DEFAULT_PROC_MOUNT_POINT);

    println!("Processes information:");
    for pid in source.pids()? {
        println!("{}", ProcessInfo::read(&source, pid));
    }
    println!();

    let accountant = MemoryAccountant::new(DEFAULT_PROC_MOUNT_POINT, DEFAULT_CGROUP_MOUNT_POINT);
    println!("Memory information:");
    println!("{}", accountant.memory_info(process::id() as i32));
    Ok(())
}

fn main() {
    init_logger();
    LogLevel::Warning.apply();

    if let Err(e) = run() {
        eprintln!("Fatal error: {e:#}");
        process::exit(1);
    }
}

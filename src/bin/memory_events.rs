// memory-events - report OOM kills in the memory cgroup of a process

use anyhow::{Context, Result};
use nginx_reaper::config::{init_logger, LogLevel, MonitorArgs};
use nginx_reaper::monitor::oom::{open_notifier, watch};
use nginx_reaper::monitor::ProcCgroupResolver;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn run(args: &MonitorArgs) -> Result<u64> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("Failed to register signal handler")?;
    }

    let resolver = ProcCgroupResolver::new(&args.proc_mount_point, &args.cgroup_mount_point);
    let mut notifier = open_notifier(&resolver, &args.cgroup_mount_point, args.pid)?;
    watch(notifier.as_mut(), &stop, |event| {
        log::info!("Received memory event: OOMKill={}", event.oom_kill);
    })
}

fn main() {
    let args = MonitorArgs::parse_args();
    init_logger();
    LogLevel::Info.apply();

    match run(&args) {
        Ok(total) => log::info!("Received signal, stopping after {total} OOM kills"),
        Err(e) => {
            log::error!("Error receiving memory event: {e:#}");
            eprintln!("Fatal error: {e:#}");
            process::exit(1);
        }
    }
}

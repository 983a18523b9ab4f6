// Daemon module - reaper schedule, HTTP surface and graceful shutdown

pub mod metrics;
pub mod reaper;
pub mod scheduler;
pub mod shutdown;

pub use metrics::{MetricsSnapshot, ReaperMetrics};
pub use reaper::Reaper;
pub use scheduler::{Job, Stopper};
pub use shutdown::ShutdownHandler;

use crate::config::Settings;
use crate::monitor::{MemoryAccountant, ProcFs};
use crate::server;
use anyhow::{Context, Result};
use std::thread;

/// Run the nginx reaper until SIGTERM and the following drain complete
pub fn run(settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut signals = shutdown::register_shutdown()?;

    let source = ProcFs::new(&settings.proc_mount_point);
    let accountant = MemoryAccountant::new(&settings.proc_mount_point, &settings.cgroup_mount_point);
    let mut reaper = Reaper::new(settings.reaper_config()?, source.clone(), accountant);
    let metrics = reaper.metrics();

    log::info!("=== Nginx Reaper v{} starting ===", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Proc mount point: {}, cgroup mount point: {}",
        settings.proc_mount_point.display(),
        settings.cgroup_mount_point.display()
    );

    let stopper = Stopper::new();
    let reaper_stopper = stopper.clone();
    thread::Builder::new()
        .name("reaper".into())
        .spawn(move || {
            if let Err(e) = scheduler::start(&mut reaper, &reaper_stopper) {
                log::error!("Reaper stopped: {e:#}");
            }
        })
        .context("Failed to start reaper thread")?;

    server::spawn(settings.server_addr.clone(), metrics)?;

    shutdown::wait_shutdown(
        &mut signals,
        settings.shutdown_interval,
        settings.shutdown_timeout,
        source,
    )?;
    stopper.stop();
    log::info!("Nginx Reaper shutting down");
    Ok(())
}

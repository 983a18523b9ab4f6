// Termination policy for nginx workers stuck shutting down

use super::metrics::ReaperMetrics;
use super::scheduler::Job;
use crate::config::ReaperConfig;
use crate::killer::{self, filter, pgrep, sort_by_create_time, Matcher};
use crate::monitor::{
    CgroupResolver, MemoryAccountant, ProcCgroupResolver, ProcFs, ProcessInfo, ProcessSource,
};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const NGINX_MASTER: &str = "nginx: master process";
pub const NGINX_WORKER: &str = "nginx: worker process";
pub const NGINX_WORKER_SHUTDOWN: &str = "nginx: worker process is shutting down";

/// Pause after each successful termination
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

/// Terminates the oldest shutting-down workers of every nginx master while
/// their backlog exceeds the cap or memory is scarce
pub struct Reaper<S = ProcFs, R = ProcCgroupResolver> {
    config: ReaperConfig,
    source: S,
    accountant: MemoryAccountant<R>,
    metrics: Arc<ReaperMetrics>,
    cooldown: Duration,
}

impl<S: ProcessSource, R: CgroupResolver> Reaper<S, R> {
    pub fn new(config: ReaperConfig, source: S, accountant: MemoryAccountant<R>) -> Self {
        Self {
            config,
            source,
            accountant,
            metrics: Arc::new(ReaperMetrics::new()),
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Replace the pause taken after each successful termination
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn metrics(&self) -> Arc<ReaperMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one policy pass over every nginx master
    pub fn reap(&self) {
        for master in pgrep(&self.source, &[Matcher::cmdline(NGINX_MASTER)]) {
            self.reap_master(master);
        }
    }

    fn reap_master(&self, master: i32) {
        let workers = pgrep(
            &self.source,
            &[Matcher::cmdline(NGINX_WORKER), Matcher::Parent(master)],
        );
        let mut shutting_down = filter(
            &self.source,
            &workers,
            &[Matcher::cmdline(NGINX_WORKER_SHUTDOWN)],
        );
        self.metrics
            .set_running(workers.len() - shutting_down.len(), shutting_down.len());

        let total = shutting_down.len();
        for i in 0..total {
            if !self.should_terminate(master, total - i) {
                break;
            }
            if i == 0 {
                // Sorted once, only when something will be terminated.
                sort_by_create_time(&self.source, &mut shutting_down);
            }

            let worker = shutting_down[i];
            log::warn!(
                "Terminating nginx worker process {}",
                ProcessInfo::read(&self.source, worker)
            );
            match killer::terminate(&self.source, worker) {
                Ok(()) => {
                    self.metrics.record_terminated();
                    thread::sleep(self.cooldown);
                }
                Err(e) => {
                    self.metrics.record_error();
                    log::error!("Failed to terminate nginx worker process {worker}: {e:#}");
                }
            }
        }
    }

    /// Whether workers of `master` should be terminated with `remaining`
    /// still shutting down
    pub fn should_terminate(&self, master: i32, remaining: usize) -> bool {
        let max = self.config.max_shutdown_workers();
        if remaining > max {
            log::warn!("Number of nginx workers shutting down {remaining} exceeds limit {max}");
            return true;
        }
        log::debug!("Number of nginx workers shutting down {remaining} within limit {max}");

        let target = self.config.available_memory_percent();
        let memory = self.accountant.memory_info(master);
        let percent = memory.available_percent();
        if percent < target {
            log::warn!(
                "Available memory {}/{} bytes is {percent}% and less than {target}% limit",
                memory.available(),
                memory.total()
            );
            return true;
        }
        log::debug!(
            "Available memory {}/{} bytes is {percent}% and within {target}% limit",
            memory.available(),
            memory.total()
        );
        false
    }
}

impl<S, R> fmt::Display for Reaper<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nginx Reaper with configuration: interval {:?}, max workers to keep {}, target available memory {}%",
            self.config.interval(),
            self.config.max_shutdown_workers(),
            self.config.available_memory_percent()
        )
    }
}

impl<S: ProcessSource, R: CgroupResolver> Job for Reaper<S, R> {
    fn interval(&self) -> Duration {
        self.config.interval()
    }

    fn run(&mut self) -> bool {
        self.reap();
        true
    }
}

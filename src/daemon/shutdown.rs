// Graceful shutdown: wait out nginx drain time after SIGTERM

use super::reaper::NGINX_MASTER;
use super::scheduler::{self, Job, Stopper};
use crate::killer::{pgrep, Matcher};
use crate::monitor::{ProcessInfo, ProcessSource};
use anyhow::{Context, Result};
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;
use std::fmt;
use std::time::Duration;

/// Whether any nginx master is still running, logging each one found
pub fn nginx_master_running<S: ProcessSource + ?Sized>(source: &S) -> bool {
    let masters = pgrep(source, &[Matcher::cmdline(NGINX_MASTER)]);
    for &master in &masters {
        log::info!(
            "Nginx master process is still running {}",
            ProcessInfo::read(source, master)
        );
    }
    !masters.is_empty()
}

/// Polls for nginx masters until they exit or the timeout budget runs out
pub struct ShutdownHandler<S> {
    interval: Duration,
    timeout: Duration,
    source: S,
}

impl<S: ProcessSource> ShutdownHandler<S> {
    pub const fn new(interval: Duration, timeout: Duration, source: S) -> Self {
        Self {
            interval,
            timeout,
            source,
        }
    }

    /// Budget left before the handler gives up
    pub const fn remaining(&self) -> Duration {
        self.timeout
    }
}

impl<S> fmt::Display for ShutdownHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nginx Reaper shutdown handler with interval {:?} and timeout {:?}",
            self.interval, self.timeout
        )
    }
}

impl<S: ProcessSource> Job for ShutdownHandler<S> {
    fn interval(&self) -> Duration {
        self.interval
    }

    /// Spend one interval of the budget; keep going while another full
    /// interval fits and a master is still up
    fn run(&mut self) -> bool {
        self.timeout = self.timeout.saturating_sub(self.interval);
        self.timeout >= self.interval && nginx_master_running(&self.source)
    }
}

/// Register for SIGTERM.
///
/// Done before any worker thread starts so an early signal is queued instead
/// of killing the process.
pub fn register_shutdown() -> Result<Signals> {
    Signals::new([SIGTERM]).context("Failed to register SIGTERM handler")
}

/// Block for one SIGTERM, then drain
pub fn wait_shutdown<S: ProcessSource>(
    signals: &mut Signals,
    interval: Duration,
    timeout: Duration,
    source: S,
) -> Result<()> {
    if let Some(signal) = signals.forever().next() {
        log::info!("Nginx Reaper received signal {signal}");
    }
    drain(interval, timeout, source)
}

/// Wait for nginx masters to exit, polling every `interval` for at most
/// `timeout`
pub fn drain<S: ProcessSource>(interval: Duration, timeout: Duration, source: S) -> Result<()> {
    if nginx_master_running(&source) {
        let mut handler = ShutdownHandler::new(interval, timeout, source);
        scheduler::start(&mut handler, &Stopper::new())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::process::tests::FakeSource;
    use nix::sys::signal::{raise, Signal};
    use std::time::Instant;

    fn with_master() -> FakeSource {
        FakeSource::default()
            .with(10, 1, "nginx: master process /usr/sbin/nginx", 100)
            .with(11, 10, "nginx: worker process is shutting down", 200)
    }

    fn without_master() -> FakeSource {
        FakeSource::default().with(11, 1, "nginx: worker process is shutting down", 200)
    }

    #[test]
    fn test_master_running() {
        assert!(nginx_master_running(&with_master()));
        assert!(!nginx_master_running(&without_master()));
        assert!(!nginx_master_running(&FakeSource::default()));
    }

    #[test]
    fn test_description() {
        let handler = ShutdownHandler::new(
            Duration::from_secs(10),
            Duration::from_secs(300),
            FakeSource::default(),
        );
        assert_eq!(
            handler.to_string(),
            "Nginx Reaper shutdown handler with interval 10s and timeout 300s"
        );
        assert_eq!(handler.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_run_spends_budget_while_master_runs() {
        let mut handler =
            ShutdownHandler::new(Duration::from_secs(10), Duration::from_secs(30), with_master());
        assert!(handler.run());
        assert_eq!(handler.remaining(), Duration::from_secs(20));
        assert!(handler.run());
        assert_eq!(handler.remaining(), Duration::from_secs(10));
        assert!(!handler.run());
        assert_eq!(handler.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_run_stops_when_interval_equals_timeout() {
        let mut handler =
            ShutdownHandler::new(Duration::from_secs(5), Duration::from_secs(5), with_master());
        assert!(!handler.run());
    }

    #[test]
    fn test_run_stops_without_master() {
        let mut handler = ShutdownHandler::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            without_master(),
        );
        assert!(!handler.run());
    }

    #[test]
    fn test_run_with_zero_budget() {
        let mut handler =
            ShutdownHandler::new(Duration::from_secs(1), Duration::ZERO, with_master());
        assert!(!handler.run());
        assert_eq!(handler.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_drain_without_master_returns_immediately() {
        let begin = Instant::now();
        drain(Duration::from_secs(3600), Duration::from_secs(3600), without_master()).unwrap();
        assert!(begin.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_drain_is_bounded_by_timeout() {
        let begin = Instant::now();
        drain(Duration::from_millis(10), Duration::from_millis(30), with_master()).unwrap();

        // Three ticks: 20ms left, 10ms left, then out of budget.
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_shutdown_on_sigterm() {
        let mut signals = register_shutdown().unwrap();
        raise(Signal::SIGTERM).unwrap();
        wait_shutdown(
            &mut signals,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            without_master(),
        )
        .unwrap();
    }
}

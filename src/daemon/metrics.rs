// Worker counters shared with the HTTP exposition

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

pub const LABEL_ACTIVE: &str = "active";
pub const LABEL_SHUTDOWN: &str = "shutdown";
pub const LABEL_ERROR: &str = "error";
pub const LABEL_TERMINATED: &str = "terminated";

const RUNNING_NAME: &str = "nginx_workers_running_current";
const RUNNING_HELP: &str = "Current number of running Nginx workers by status";
const SHUTDOWN_NAME: &str = "nginx_workers_shutdown_total";
const SHUTDOWN_HELP: &str = "Total number of shutdown Nginx workers by status";

/// Worker gauges and termination counters.
///
/// Written by the reaper only; readers go through [`ReaperMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct ReaperMetrics {
    active: AtomicU64,
    shutdown: AtomicU64,
    terminated: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`ReaperMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub active: u64,
    pub shutdown: u64,
    pub terminated: u64,
    pub errors: u64,
}

impl ReaperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_running(&self, active: usize, shutdown: usize) {
        self.active.store(active as u64, Ordering::Relaxed);
        self.shutdown.store(shutdown as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active: self.active.load(Ordering::Relaxed),
            shutdown: self.shutdown.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of every series, zeros included
    pub fn render(&self) -> String {
        self.snapshot().render()
    }
}

impl MetricsSnapshot {
    pub fn render(&self) -> String {
        let mut out = String::new();
        write_family(
            &mut out,
            RUNNING_NAME,
            RUNNING_HELP,
            "gauge",
            &[(LABEL_ACTIVE, self.active), (LABEL_SHUTDOWN, self.shutdown)],
        );
        write_family(
            &mut out,
            SHUTDOWN_NAME,
            SHUTDOWN_HELP,
            "counter",
            &[(LABEL_ERROR, self.errors), (LABEL_TERMINATED, self.terminated)],
        );
        out
    }
}

fn write_family(out: &mut String, name: &str, help: &str, kind: &str, series: &[(&str, u64)]) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    for (status, value) in series {
        let _ = writeln!(out, "{name}{{status=\"{status}\"}} {value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = ReaperMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());

        let text = metrics.render();
        assert!(text.contains("nginx_workers_running_current{status=\"active\"} 0\n"));
        assert!(text.contains("nginx_workers_running_current{status=\"shutdown\"} 0\n"));
        assert!(text.contains("nginx_workers_shutdown_total{status=\"error\"} 0\n"));
        assert!(text.contains("nginx_workers_shutdown_total{status=\"terminated\"} 0\n"));
    }

    #[test]
    fn test_updates_are_visible_in_snapshot() {
        let metrics = ReaperMetrics::new();
        metrics.set_running(3, 2);
        metrics.record_terminated();
        metrics.record_terminated();
        metrics.record_error();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                active: 3,
                shutdown: 2,
                terminated: 2,
                errors: 1,
            }
        );

        metrics.set_running(1, 0);
        assert_eq!(metrics.snapshot().active, 1);
        assert_eq!(metrics.snapshot().terminated, 2);
    }

    #[test]
    fn test_render_format() {
        let snapshot = MetricsSnapshot {
            active: 4,
            shutdown: 1,
            terminated: 7,
            errors: 2,
        };
        let expected = "\
# HELP nginx_workers_running_current Current number of running Nginx workers by status
# TYPE nginx_workers_running_current gauge
nginx_workers_running_current{status=\"active\"} 4
nginx_workers_running_current{status=\"shutdown\"} 1
# HELP nginx_workers_shutdown_total Total number of shutdown Nginx workers by status
# TYPE nginx_workers_shutdown_total counter
nginx_workers_shutdown_total{status=\"error\"} 2
nginx_workers_shutdown_total{status=\"terminated\"} 7
";
        assert_eq!(snapshot.render(), expected);
    }
}

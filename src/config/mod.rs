// Configuration module

mod args;
mod env;
pub(crate) mod level;

pub use args::MonitorArgs;
pub use env::{parse_duration, EnvSource};
pub use level::{init_logger, LogLevel};

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_REAPER_INTERVAL: &str = "REAPER_INTERVAL";
pub const ENV_MAX_SHUTDOWN_WORKERS: &str = "MAX_SHUTDOWN_WORKERS";
pub const ENV_AVAILABLE_MEMORY_PERCENT: &str = "AVAILABLE_MEMORY_PERCENT";
pub const ENV_SERVER_ADDR: &str = "SERVER_ADDR";
pub const ENV_SHUTDOWN_INTERVAL: &str = "SHUTDOWN_INTERVAL";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";
pub const ENV_PROC_MOUNT_POINT: &str = "PROC_MOUNT_POINT";
pub const ENV_CGROUP_MOUNT_POINT: &str = "CGROUP_MOUNT_POINT";

pub const DEFAULT_PROC_MOUNT_POINT: &str = "/proc";
pub const DEFAULT_CGROUP_MOUNT_POINT: &str = "/sys/fs/cgroup";

/// Validated reaper policy parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    interval: Duration,
    max_shutdown_workers: usize,
    available_memory_percent: u32,
}

impl ReaperConfig {
    /// Build a policy configuration.
    ///
    /// The interval must be positive, the worker cap at least one and the
    /// memory target a percentage between 0 and 100.
    pub fn new(
        interval: Duration,
        max_shutdown_workers: i64,
        available_memory_percent: i64,
    ) -> Result<Self> {
        if interval.is_zero() {
            bail!("Non-positive interval {interval:?}");
        }
        let max_shutdown_workers = usize::try_from(max_shutdown_workers)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| anyhow!("Non-positive max shutdown workers {max_shutdown_workers}"))?;
        let available_memory_percent = u32::try_from(available_memory_percent)
            .ok()
            .filter(|&p| p <= 100)
            .ok_or_else(|| anyhow!("Invalid available memory percent {available_memory_percent}"))?;

        Ok(Self {
            interval,
            max_shutdown_workers,
            available_memory_percent,
        })
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Shutting-down workers tolerated before the oldest are terminated
    pub const fn max_shutdown_workers(&self) -> usize {
        self.max_shutdown_workers
    }

    /// Available memory percentage below which workers are terminated
    pub const fn available_memory_percent(&self) -> u32 {
        self.available_memory_percent
    }
}

/// Everything the reaper daemon reads from its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: LogLevel,
    pub reaper_interval: Duration,
    pub max_shutdown_workers: i64,
    pub available_memory_percent: i64,
    pub server_addr: String,
    pub shutdown_interval: Duration,
    pub shutdown_timeout: Duration,
    pub proc_mount_point: PathBuf,
    pub cgroup_mount_point: PathBuf,
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(&EnvSource::process())
    }

    /// Read settings through `env`, applying defaults for unset or invalid
    /// variables
    pub fn load<F: Fn(&str) -> Option<String>>(env: &EnvSource<F>) -> Result<Self> {
        Ok(Self {
            log_level: env.get_log_level(ENV_LOG_LEVEL, "INFO")?,
            reaper_interval: env.get_duration(ENV_REAPER_INTERVAL, "30s")?,
            max_shutdown_workers: env.get_int(ENV_MAX_SHUTDOWN_WORKERS, "255")?,
            available_memory_percent: env.get_int(ENV_AVAILABLE_MEMORY_PERCENT, "0")?,
            server_addr: env.get_string(ENV_SERVER_ADDR, ":11254")?,
            shutdown_interval: env.get_duration(ENV_SHUTDOWN_INTERVAL, "10s")?,
            shutdown_timeout: env.get_duration(ENV_SHUTDOWN_TIMEOUT, "5m")?,
            proc_mount_point: env
                .get_string(ENV_PROC_MOUNT_POINT, DEFAULT_PROC_MOUNT_POINT)?
                .into(),
            cgroup_mount_point: env
                .get_string(ENV_CGROUP_MOUNT_POINT, DEFAULT_CGROUP_MOUNT_POINT)?
                .into(),
        })
    }

    pub fn reaper_config(&self) -> Result<ReaperConfig> {
        ReaperConfig::new(
            self.reaper_interval,
            self.max_shutdown_workers,
            self.available_memory_percent,
        )
    }

    /// Reject settings that would only fail once the daemon is running
    pub fn validate(&self) -> Result<()> {
        self.reaper_config()?;
        if self.shutdown_interval.is_zero() {
            bail!("Non-positive shutdown interval {:?}", self.shutdown_interval);
        }
        Ok(())
    }
}

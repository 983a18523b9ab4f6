// Runtime log level shared by the environment and the HTTP config endpoint

use anyhow::{bail, Error};
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;

/// Operator-facing log level.
///
/// `Panic` keeps only fatal messages, which the binaries print to stderr
/// themselves, so the logger is switched off entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Panic,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [Self; 5] = [
        Self::Panic,
        Self::Error,
        Self::Warning,
        Self::Info,
        Self::Debug,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    pub const fn to_filter(self) -> LevelFilter {
        match self {
            Self::Panic => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warning => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }

    /// Level currently in effect
    pub fn current() -> Self {
        match log::max_level() {
            LevelFilter::Off => Self::Panic,
            LevelFilter::Error => Self::Error,
            LevelFilter::Warn => Self::Warning,
            LevelFilter::Info => Self::Info,
            LevelFilter::Debug | LevelFilter::Trace => Self::Debug,
        }
    }

    /// Make this the effective level for every thread
    pub fn apply(self) {
        log::set_max_level(self.to_filter());
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match Self::ALL.into_iter().find(|level| level.name() == lower) {
            Some(level) => Ok(level),
            None => bail!("invalid log level: {s:?}"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Install the process logger.
///
/// The backend accepts everything up to debug; the effective level is then
/// narrowed with [`LogLevel::apply`].
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .format_timestamp_secs()
        .init();
}

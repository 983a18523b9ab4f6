// Environment variable configuration support

use super::LogLevel;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fmt::Debug;
use std::time::Duration;

/// Duration units and their length in nanoseconds
const DURATION_UNITS: [(&str, u128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fraction digits beyond this cannot change a nanosecond count
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a duration such as `300ms`, `10s`, `1.5h` or `1h30m`.
///
/// A bare `0` is accepted; every other component needs a unit. Negative
/// durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.starts_with('-') {
        bail!("negative duration {input:?}");
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        bail!("invalid duration {input:?}");
    }

    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            bail!("invalid duration {input:?}");
        }
        if unit.is_empty() {
            bail!("missing unit in duration {input:?}");
        }
        let scale = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|&(_, scale)| scale)
            .ok_or_else(|| anyhow!("unknown unit {unit:?} in duration {input:?}"))?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .with_context(|| format!("invalid duration {input:?}"))?
        };
        let mut component = whole
            .checked_mul(scale)
            .ok_or_else(|| anyhow!("duration {input:?} out of range"))?;

        if !fraction.is_empty() {
            let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let digits: u128 = fraction
                .parse()
                .with_context(|| format!("invalid duration {input:?}"))?;
            component = component
                .checked_add(digits * scale / 10u128.pow(fraction.len() as u32))
                .ok_or_else(|| anyhow!("duration {input:?} out of range"))?;
        }

        nanos = nanos
            .checked_add(component)
            .ok_or_else(|| anyhow!("duration {input:?} out of range"))?;
        rest = tail;
    }

    let secs = u64::try_from(nanos / NANOS_PER_SEC)
        .map_err(|_| anyhow!("duration {input:?} out of range"))?;
    Ok(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

fn parse_int(s: &str) -> Result<i64> {
    s.parse().with_context(|| format!("invalid integer {s:?}"))
}

fn process_var(name: &str) -> Option<String> {
    env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

/// Typed reads of environment variables with per-variable defaults
pub struct EnvSource<F = fn(&str) -> Option<String>> {
    lookup: F,
}

impl EnvSource {
    /// Variables of the running process
    pub fn process() -> Self {
        Self {
            lookup: process_var,
        }
    }
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    pub const fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn get_duration(&self, name: &str, default: &str) -> Result<Duration> {
        self.parse_value(name, default, parse_duration)
    }

    pub fn get_int(&self, name: &str, default: &str) -> Result<i64> {
        self.parse_value(name, default, parse_int)
    }

    pub fn get_log_level(&self, name: &str, default: &str) -> Result<LogLevel> {
        self.parse_value(name, default, |s| s.parse())
    }

    pub fn get_string(&self, name: &str, default: &str) -> Result<String> {
        self.parse_value(name, default, |s| Ok(s.to_string()))
    }

    /// Parse `name` with `parser`, falling back to `default`.
    ///
    /// A default that does not parse is an error. An unparsable variable is
    /// logged and replaced by the default.
    fn parse_value<T, P>(&self, name: &str, default: &str, parser: P) -> Result<T>
    where
        T: Debug,
        P: Fn(&str) -> Result<T>,
    {
        let fallback = parser(default)
            .with_context(|| format!("Invalid default value {default:?} for {name}"))?;

        if let Some(value) = (self.lookup)(name) {
            match parser(&value) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => log::error!(
                    "Invalid environment variable {name}, {e:#}, using default {fallback:?}"
                ),
            }
        }
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> EnvSource<impl Fn(&str) -> Option<String>> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::new(move |name: &str| vars.get(name).cloned())
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("42ns").unwrap(), Duration::from_nanos(42));
        assert_eq!(parse_duration("+1s").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_duration_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1m30.5s").unwrap(), Duration::from_millis(90_500));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.s").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_duration_rejects_invalid() {
        for bad in ["", "10", "s", "-5s", "5 s", "5x", "1.2.3s", ".s", "1h30"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
        assert!(parse_duration("99999999999999999999h").is_err());

        let err = parse_duration("340282366920938463463374607431768211.999us").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_out_of_range_override_uses_default() {
        let env = source(&[("REAPER_INTERVAL", "340282366920938463463374607431768211.999us")]);
        assert_eq!(env.get_duration("REAPER_INTERVAL", "30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_unset_variable_uses_default() {
        let env = source(&[]);
        assert_eq!(env.get_duration("REAPER_INTERVAL", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(env.get_int("MAX_SHUTDOWN_WORKERS", "255").unwrap(), 255);
        assert_eq!(env.get_string("SERVER_ADDR", ":11254").unwrap(), ":11254");
        assert_eq!(env.get_log_level("LOG_LEVEL", "INFO").unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_set_variable_overrides_default() {
        let env = source(&[
            ("REAPER_INTERVAL", "1m"),
            ("MAX_SHUTDOWN_WORKERS", "-3"),
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("LOG_LEVEL", "debug"),
        ]);
        assert_eq!(env.get_duration("REAPER_INTERVAL", "30s").unwrap(), Duration::from_secs(60));
        assert_eq!(env.get_int("MAX_SHUTDOWN_WORKERS", "255").unwrap(), -3);
        assert_eq!(env.get_string("SERVER_ADDR", ":11254").unwrap(), "127.0.0.1:8080");
        assert_eq!(env.get_log_level("LOG_LEVEL", "INFO").unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_invalid_variable_falls_back() {
        let env = source(&[
            ("REAPER_INTERVAL", "soon"),
            ("MAX_SHUTDOWN_WORKERS", "many"),
            ("LOG_LEVEL", "verbose"),
        ]);
        assert_eq!(env.get_duration("REAPER_INTERVAL", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(env.get_int("MAX_SHUTDOWN_WORKERS", "255").unwrap(), 255);
        assert_eq!(env.get_log_level("LOG_LEVEL", "INFO").unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_invalid_default_is_fatal() {
        let env = source(&[("REAPER_INTERVAL", "10s")]);
        let err = env.get_duration("REAPER_INTERVAL", "thirty").unwrap_err();
        assert!(err.to_string().contains("REAPER_INTERVAL"));
        assert!(env.get_int("MAX_SHUTDOWN_WORKERS", "").is_err());
        assert!(env.get_log_level("LOG_LEVEL", "loud").is_err());
    }
}

// System memory parsing from <proc root>/meminfo

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// System-wide memory figures, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemMemory {
    /// `MemTotal` converted to bytes
    pub total: u64,
    /// `MemAvailable` converted to bytes
    pub available: u64,
}

impl SystemMemory {
    /// Read `meminfo` below the given proc mount root.
    ///
    /// Both `MemTotal` and `MemAvailable` must be present; the kernel reports
    /// them in kibibytes.
    pub fn read(proc_root: &Path) -> Result<Self> {
        let path = proc_root.join("meminfo");
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut total_kb = None;
        let mut available_kb = None;

        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            let parts: Vec<&str> = line.split_whitespace().collect();

            if parts.len() < 2 {
                continue;
            }

            let key = parts[0].trim_end_matches(':');
            let slot = match key {
                "MemTotal" => &mut total_kb,
                "MemAvailable" => &mut available_kb,
                _ => continue,
            };
            let value: u64 = parts[1]
                .parse()
                .with_context(|| format!("Failed to parse value for {key}"))?;
            *slot = Some(value);
        }

        let (Some(total_kb), Some(available_kb)) = (total_kb, available_kb) else {
            bail!("MemTotal or MemAvailable missing from {}", path.display());
        };

        Ok(Self {
            total: total_kb.saturating_mul(1024),
            available: available_kb.saturating_mul(1024),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_meminfo(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("meminfo"), content).unwrap();
        dir
    }

    #[test]
    fn test_read_converts_kib_to_bytes() {
        let dir = write_meminfo("MemTotal: 1000 kB\nMemFree: 10 kB\nMemAvailable: 500 kB\n");
        let mem = SystemMemory::read(dir.path()).unwrap();
        assert_eq!(mem.total, 1_024_000);
        assert_eq!(mem.available, 512_000);
    }

    #[test]
    fn test_read_ignores_unrelated_lines() {
        let dir = write_meminfo(
            "MemTotal:       16314564 kB\n\
             MemFree:         1207840 kB\n\
             MemAvailable:    9876540 kB\n\
             HugePages_Total:       0\n\
             Hugepagesize:       2048 kB\n",
        );
        let mem = SystemMemory::read(dir.path()).unwrap();
        assert_eq!(mem.total, 16_314_564 * 1024);
        assert_eq!(mem.available, 9_876_540 * 1024);
    }

    #[test]
    fn test_read_missing_available() {
        let dir = write_meminfo("MemTotal: 1000 kB\nMemFree: 10 kB\n");
        let err = SystemMemory::read(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(SystemMemory::read(dir.path()).is_err());
    }

    #[test]
    fn test_read_malformed_value() {
        let dir = write_meminfo("MemTotal: lots kB\nMemAvailable: 500 kB\n");
        let err = SystemMemory::read(dir.path()).unwrap_err();
        assert!(err.to_string().contains("MemTotal"));
    }
}

// Kernel OOM-kill notifications for a memory cgroup

use super::cgroup::{memory_cgroup_dir, CgroupMode, CgroupResolver};
use anyhow::{anyhow, bail, Context, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Size of an eventfd counter
const EVENT_SIZE: usize = 8;

/// How often the watch loop checks for cancellation
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cumulative OOM kills observed since the monitor started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OomEvent {
    pub oom_kill: u64,
}

/// Source of OOM-kill notifications
pub trait OomNotifier {
    /// Wait up to `timeout` for a notification.
    ///
    /// Returns the number of new OOM kills, or `None` if nothing happened.
    fn wait(&mut self, timeout: Duration) -> Result<Option<u64>>;
}

/// Decode one eventfd notification.
///
/// The kernel hands out exactly eight bytes holding a native-endian counter
/// that is never zero.
pub fn decode_counter<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; EVENT_SIZE];
    let n = reader.read(&mut buf).context("Failed to read eventfd")?;
    log::debug!("Read {n} bytes from eventfd: {buf:?}");
    if n != EVENT_SIZE {
        bail!("Invalid eventfd read of {n} bytes, expected {EVENT_SIZE}");
    }
    match u64::from_ne_bytes(buf) {
        0 => bail!("Invalid eventfd value: {buf:?}"),
        value => Ok(value),
    }
}

/// Block until `fd` is readable or `timeout` expires
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(e).context("Failed to poll notification descriptor"),
    }
}

/// Legacy notifier: an eventfd registered against `memory.oom_control`
#[derive(Debug)]
pub struct EventfdNotifier {
    event: File,
    _oom_control: File,
}

impl EventfdNotifier {
    pub fn open(cgroup_dir: &Path) -> Result<Self> {
        let oom_control_path = cgroup_dir.join("memory.oom_control");
        let oom_control = File::open(&oom_control_path)
            .with_context(|| format!("Failed to open {}", oom_control_path.display()))?;

        let efd = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC)
            .context("Failed to create eventfd")?;
        let event = File::from(efd.as_fd().try_clone_to_owned()?);

        let control_path = cgroup_dir.join("cgroup.event_control");
        let mut control = OpenOptions::new()
            .write(true)
            .open(&control_path)
            .with_context(|| format!("Failed to open {}", control_path.display()))?;
        // The kernel parses each write on its own, so register in one call.
        let registration = format!("{} {}", event.as_raw_fd(), oom_control.as_raw_fd());
        control
            .write_all(registration.as_bytes())
            .with_context(|| format!("Failed to register eventfd with {}", control_path.display()))?;

        Ok(Self {
            event,
            _oom_control: oom_control,
        })
    }
}

impl OomNotifier for EventfdNotifier {
    fn wait(&mut self, timeout: Duration) -> Result<Option<u64>> {
        if !wait_readable(self.event.as_fd(), timeout)? {
            return Ok(None);
        }
        decode_counter(&mut self.event).map(Some)
    }
}

/// Extract the `oom_kill` counter from `memory.events` content
pub fn parse_oom_kill(content: &str) -> Result<u64> {
    content
        .lines()
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("oom_kill") => parts.next(),
                _ => None,
            }
        })
        .ok_or_else(|| anyhow!("No oom_kill entry in memory.events"))?
        .parse()
        .context("Invalid oom_kill value")
}

/// Unified notifier: an inotify watch on `memory.events`
pub struct MemoryEventsNotifier {
    inotify: Inotify,
    path: PathBuf,
    last: u64,
}

impl MemoryEventsNotifier {
    pub fn open(cgroup_dir: &Path) -> Result<Self> {
        let path = cgroup_dir.join("memory.events");
        let last = Self::read_oom_kill(&path)?;

        let inotify = Inotify::init(InitFlags::IN_CLOEXEC | InitFlags::IN_NONBLOCK)
            .context("Failed to initialise inotify")?;
        inotify
            .add_watch(path.as_path(), AddWatchFlags::IN_MODIFY)
            .with_context(|| format!("Failed to watch {}", path.display()))?;

        Ok(Self {
            inotify,
            path,
            last,
        })
    }

    fn read_oom_kill(path: &Path) -> Result<u64> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_oom_kill(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

impl OomNotifier for MemoryEventsNotifier {
    fn wait(&mut self, timeout: Duration) -> Result<Option<u64>> {
        if !wait_readable(self.inotify.as_fd(), timeout)? {
            return Ok(None);
        }
        match self.inotify.read_events() {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(e) => return Err(e).context("Failed to read inotify events"),
        }

        let current = Self::read_oom_kill(&self.path)?;
        let delta = current.saturating_sub(self.last);
        self.last = current;
        Ok((delta > 0).then_some(delta))
    }
}

/// Open the OOM notifier of the memory cgroup owning `pid`
pub fn open_notifier<R: CgroupResolver + ?Sized>(
    resolver: &R,
    cgroup_root: &Path,
    pid: i32,
) -> Result<Box<dyn OomNotifier>> {
    let (mode, dir) = memory_cgroup_dir(resolver, cgroup_root, pid)?;
    log::info!("Using {} cgroup path: {}", mode, dir.display());
    let notifier: Box<dyn OomNotifier> = match mode {
        CgroupMode::Unified => Box::new(MemoryEventsNotifier::open(&dir)?),
        CgroupMode::Legacy => Box::new(EventfdNotifier::open(&dir)?),
    };
    Ok(notifier)
}

/// Report cumulative OOM kills until `stop` is set.
///
/// Returns the final count on cancellation; notifier errors end the loop and
/// are returned as-is.
pub fn watch<N, F>(notifier: &mut N, stop: &AtomicBool, mut on_event: F) -> Result<u64>
where
    N: OomNotifier + ?Sized,
    F: FnMut(OomEvent),
{
    let mut event = OomEvent::default();
    log::info!("Waiting for memory events...");
    while !stop.load(Ordering::SeqCst) {
        if let Some(delta) = notifier.wait(POLL_INTERVAL)? {
            event.oom_kill = event.oom_kill.saturating_add(delta);
            on_event(event);
        }
    }
    Ok(event.oom_kill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::cgroup::tests::{write, StaticResolver};
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Replays scripted results, then raises the stop flag
    struct ScriptedNotifier<'a> {
        script: VecDeque<Result<Option<u64>>>,
        stop: &'a AtomicBool,
    }

    impl OomNotifier for ScriptedNotifier<'_> {
        fn wait(&mut self, _timeout: Duration) -> Result<Option<u64>> {
            let next = self.script.pop_front().unwrap_or(Ok(None));
            if self.script.is_empty() {
                self.stop.store(true, Ordering::SeqCst);
            }
            next
        }
    }

    #[test]
    fn test_decode_counter() {
        let bytes = 3u64.to_ne_bytes();
        assert_eq!(decode_counter(&mut &bytes[..]).unwrap(), 3);
    }

    #[test]
    fn test_decode_counter_short_read() {
        let bytes = [1u8, 0, 0, 0];
        let err = decode_counter(&mut &bytes[..]).unwrap_err();
        assert!(err.to_string().contains("4 bytes"));
    }

    #[test]
    fn test_decode_counter_zero() {
        let bytes = [0u8; 8];
        assert!(decode_counter(&mut &bytes[..]).is_err());
    }

    #[test]
    fn test_parse_oom_kill() {
        let content = "low 0\nhigh 0\nmax 12\noom 3\noom_kill 2\noom_group_kill 0\n";
        assert_eq!(parse_oom_kill(content).unwrap(), 2);
        assert!(parse_oom_kill("low 0\noom 1\n").is_err());
        assert!(parse_oom_kill("oom_kill many\n").is_err());
    }

    #[test]
    fn test_watch_accumulates() {
        let stop = AtomicBool::new(false);
        let mut notifier = ScriptedNotifier {
            script: VecDeque::from(vec![Ok(Some(1)), Ok(None), Ok(Some(2)), Ok(Some(1))]),
            stop: &stop,
        };

        let mut seen = Vec::new();
        let total = watch(&mut notifier, &stop, |e| seen.push(e.oom_kill)).unwrap();
        assert_eq!(seen, vec![1, 3, 4]);
        assert_eq!(total, 4);
    }

    #[test]
    fn test_watch_surfaces_errors() {
        let stop = AtomicBool::new(false);
        let mut notifier = ScriptedNotifier {
            script: VecDeque::from(vec![
                Ok(Some(1)),
                Err(anyhow!("Invalid eventfd read of 4 bytes, expected 8")),
                Ok(Some(5)),
            ]),
            stop: &stop,
        };

        let mut seen = Vec::new();
        let err = watch(&mut notifier, &stop, |e| seen.push(e.oom_kill)).unwrap_err();
        assert!(err.to_string().contains("4 bytes"));
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_watch_cancelled_before_start() {
        let stop = AtomicBool::new(true);
        let mut notifier = ScriptedNotifier {
            script: VecDeque::from(vec![Ok(Some(1))]),
            stop: &stop,
        };
        assert_eq!(watch(&mut notifier, &stop, |_| {}).unwrap(), 0);
    }

    #[test]
    fn test_memory_events_notifier() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("memory.events");
        fs::write(&events, "low 0\nhigh 0\nmax 0\noom 1\noom_kill 1\n").unwrap();

        let mut notifier = MemoryEventsNotifier::open(dir.path()).unwrap();
        assert_eq!(notifier.wait(Duration::from_millis(10)).unwrap(), None);

        fs::write(&events, "low 0\nhigh 0\nmax 2\noom 3\noom_kill 3\n").unwrap();
        assert_eq!(notifier.wait(Duration::from_secs(5)).unwrap(), Some(2));
    }

    #[test]
    fn test_eventfd_notifier_requires_legacy_files() {
        let dir = TempDir::new().unwrap();
        let err = EventfdNotifier::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("memory.oom_control"));
    }

    #[test]
    fn test_open_notifier_unified() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("kubepods/nginx/memory.events"), "oom 0\noom_kill 0\n");
        let resolver = StaticResolver {
            mode: CgroupMode::Unified,
            path: Some("/kubepods/nginx".to_string()),
        };

        let mut notifier = open_notifier(&resolver, dir.path(), 1).unwrap();
        assert_eq!(notifier.wait(Duration::from_millis(10)).unwrap(), None);

        write(&dir.path().join("kubepods/nginx/memory.events"), "oom 1\noom_kill 1\n");
        assert_eq!(notifier.wait(Duration::from_secs(5)).unwrap(), Some(1));
    }

    #[test]
    fn test_open_notifier_unresolved_cgroup() {
        let dir = TempDir::new().unwrap();
        let resolver = StaticResolver {
            mode: CgroupMode::Unified,
            path: None,
        };
        assert!(open_notifier(&resolver, dir.path(), 1).is_err());
    }
}

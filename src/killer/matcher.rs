// Process matching, searching and ordering

use crate::monitor::ProcessSource;

/// Predicate over a process.
///
/// A predicate whose attribute cannot be read does not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Command line contains the given substring
    CmdlineContains(String),
    /// Parent pid equals the given pid
    Parent(i32),
}

impl Matcher {
    pub fn cmdline(substr: impl Into<String>) -> Self {
        Self::CmdlineContains(substr.into())
    }

    pub fn matches<S: ProcessSource + ?Sized>(&self, source: &S, pid: i32) -> bool {
        match self {
            Self::CmdlineContains(substr) => source
                .cmdline(pid)
                .is_ok_and(|cmdline| cmdline.contains(substr.as_str())),
            Self::Parent(ppid) => source.parent_pid(pid).is_ok_and(|parent| parent == *ppid),
        }
    }
}

/// Whether `pid` satisfies every matcher, checked left to right
pub fn matches_all<S: ProcessSource + ?Sized>(source: &S, pid: i32, matchers: &[Matcher]) -> bool {
    matchers.iter().all(|m| m.matches(source, pid))
}

/// Keep the pids satisfying every matcher, preserving order
pub fn filter<S: ProcessSource + ?Sized>(source: &S, pids: &[i32], matchers: &[Matcher]) -> Vec<i32> {
    pids.iter()
        .copied()
        .filter(|&pid| matches_all(source, pid, matchers))
        .collect()
}

/// Search all visible processes.
///
/// An unreadable process list yields no matches.
pub fn pgrep<S: ProcessSource + ?Sized>(source: &S, matchers: &[Matcher]) -> Vec<i32> {
    match source.pids() {
        Ok(pids) => filter(source, &pids, matchers),
        Err(e) => {
            log::error!("Failed to list processes: {e:#}");
            Vec::new()
        }
    }
}

/// Sort pids by start time, oldest first.
///
/// Stable insertion sort where "less" requires both start times to be
/// readable, so a pid with an unreadable start time never moves past a
/// neighbour and no neighbour moves past it.
pub fn sort_by_create_time<S: ProcessSource + ?Sized>(source: &S, pids: &mut [i32]) {
    let mut keyed: Vec<(Option<u64>, i32)> = pids
        .iter()
        .map(|&pid| (source.start_time(pid).ok(), pid))
        .collect();

    for i in 1..keyed.len() {
        let mut j = i;
        while j > 0 && is_older(keyed[j].0, keyed[j - 1].0) {
            keyed.swap(j, j - 1);
            j -= 1;
        }
    }

    for (slot, (_, pid)) in pids.iter_mut().zip(keyed) {
        *slot = pid;
    }
}

fn is_older(a: Option<u64>, b: Option<u64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a < b)
}

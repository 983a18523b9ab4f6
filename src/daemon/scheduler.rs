// Fixed-period execution of jobs

use anyhow::{bail, Result};
use std::fmt::Display;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Unit of work run at a regular interval
pub trait Job: Display {
    /// Period between two runs
    fn interval(&self) -> Duration;

    /// Run once; returning false stops the schedule
    fn run(&mut self) -> bool;
}

/// Cancellation handle shared between a schedule and its owner
#[derive(Debug, Clone, Default)]
pub struct Stopper {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Stopper {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop every schedule watching this handle
    pub fn stop(&self) {
        *self.flag() = true;
        self.inner.1.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.flag()
    }

    /// Sleep until `deadline`, returning true as soon as the handle is stopped
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.flag();
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = self
                .inner
                .1
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *stopped
    }
}

/// First tick strictly after `now`, skipping any that were missed
fn next_tick(mut tick: Instant, period: Duration, now: Instant) -> Instant {
    tick += period;
    while tick <= now {
        tick += period;
    }
    tick
}

/// Run `job` every interval until it returns false or `stopper` fires.
///
/// The first run happens one interval after the call. A run that overruns
/// its period drops the ticks it missed instead of replaying them.
pub fn start<J: Job + ?Sized>(job: &mut J, stopper: &Stopper) -> Result<()> {
    let period = job.interval();
    if period.is_zero() {
        bail!("Non-positive interval for {job}");
    }

    log::info!("Scheduled {job}");
    let mut tick = Instant::now() + period;
    loop {
        if stopper.wait_until(tick) {
            log::info!("Cancelled {job}");
            break;
        }
        log::info!("Executing {job}");
        if !job.run() {
            break;
        }
        tick = next_tick(tick, period, Instant::now());
    }
    Ok(())
}

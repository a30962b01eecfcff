//! Shared blocking and wake-up for pollers.
//!
//! One coordinator is shared by a set of event queues. Pollers sleep on its
//! condition variable; any enqueue on any of those queues broadcasts a wake
//! and every sleeper re-checks all of its own queues. The broadcast is not
//! targeted.
//!
//! A generation counter bumped on every wake closes the window between a
//! poller's empty sweep and its sleep: if the generation moved, the poller
//! sweeps again instead of sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use corelib::{EventQueueConfig, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};

/// How long `poll` may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// A single sweep, never block.
    NoWait,
    /// Block for at most this long, re-sweeping after every wake.
    After(Duration),
    /// Block until an event arrives.
    Infinite,
}

impl Timeout {
    /// Milliseconds with the conventional encoding: negative means
    /// infinite, zero means no wait.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => Timeout::Infinite,
            0 => Timeout::NoWait,
            ms => Timeout::After(Duration::from_millis(ms as u64)),
        }
    }

    /// Absolute deadline, `None` when unbounded.
    pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Timeout::NoWait => Some(now),
            Timeout::After(d) => now.checked_add(*d),
            Timeout::Infinite => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(d)
        }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Timeout::Infinite, Timeout::from)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WaitState {
    pub(crate) generation: u64,
    waiters: usize,
}

/// Wait domain shared by a group of event queues.
#[derive(Debug)]
pub struct WaitCoordinator {
    state: Mutex<WaitState>,
    wakeup: Condvar,
    config: EventQueueConfig,
}

impl WaitCoordinator {
    pub fn new(config: EventQueueConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            state: Mutex::new(WaitState::default()),
            wakeup: Condvar::new(),
            config,
        }))
    }

    pub fn config(&self) -> &EventQueueConfig {
        &self.config
    }

    /// Wake every thread blocked in `poll`.
    pub fn wake_all(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if state.waiters > 0 {
            self.wakeup.notify_all();
        }
    }

    /// Threads currently asleep in `poll`.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock()
    }

    /// Sleep until woken or `deadline` passes. Returns true on timeout.
    pub(crate) fn sleep(
        &self,
        state: &mut MutexGuard<'_, WaitState>,
        deadline: Option<Instant>,
    ) -> bool {
        state.waiters += 1;
        let timed_out = match deadline {
            Some(deadline) => self.wakeup.wait_until(state, deadline).timed_out(),
            None => {
                self.wakeup.wait(state);
                false
            }
        };
        state.waiters -= 1;
        timed_out
    }
}

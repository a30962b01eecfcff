//! Blocking poll across many queues.

use std::sync::Arc;
use std::time::Instant;

use corelib::{Error, Result};
use tracing::trace;

use crate::event::Polled;
use crate::queue::EventQueue;
use crate::wait::{Timeout, WaitCoordinator};

impl WaitCoordinator {
    /// Wait for an event on any of `queues`.
    ///
    /// Each sweep checks the queues in order and the first one holding an
    /// event wins, so the lowest index is reported when several are ready.
    /// Between sweeps the caller sleeps until some enqueue on this
    /// coordinator wakes it or the timeout expires.
    ///
    /// Returns `Ok(None)` once a final sweep after the time budget is
    /// exhausted finds nothing. An overflowed dequeue still counts as a
    /// result; check [`Polled::status`].
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty list or a queue bound to another
    ///   coordinator.
    /// - `InvalidHandle` for an empty entry; no queue is touched.
    /// - `Destroyed` if a queue reached during a sweep has been destroyed.
    pub fn poll<P: Clone>(
        self: &Arc<Self>,
        queues: &[Option<&EventQueue<P>>],
        timeout: Timeout,
    ) -> Result<Option<Polled<P>>> {
        if queues.is_empty() {
            return Err(Error::InvalidArgument("empty poll list".into()));
        }

        let queues = queues
            .iter()
            .enumerate()
            .map(|(index, q)| q.ok_or(Error::InvalidHandle { index }))
            .collect::<Result<Vec<_>>>()?;

        if let Some(index) = queues
            .iter()
            .position(|q| !Arc::ptr_eq(q.waiter(), self))
        {
            return Err(Error::InvalidArgument(format!(
                "queue {} belongs to a different wait coordinator",
                index
            )));
        }

        let deadline = timeout.deadline(Instant::now());

        loop {
            let observed = self.generation();

            if let Some(hit) = sweep(&queues)? {
                return Ok(Some(hit));
            }
            if timeout == Timeout::NoWait {
                return Ok(None);
            }

            let mut state = self.lock();
            if state.generation != observed {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    drop(state);
                    trace!(queues = queues.len(), "poll timed out");
                    return sweep(&queues);
                }
                // Something was enqueued while we swept.
                continue;
            }
            if self.sleep(&mut state, deadline) {
                drop(state);
                trace!(queues = queues.len(), "poll timed out");
                return sweep(&queues);
            }
        }
    }
}

fn sweep<P: Clone>(queues: &[&EventQueue<P>]) -> Result<Option<Polled<P>>> {
    for (which, queue) in queues.iter().enumerate() {
        if let Some(dequeued) = queue.dequeue()? {
            return Ok(Some(Polled::new(dequeued, which)));
        }
    }
    Ok(None)
}

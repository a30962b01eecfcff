//! Event records and dequeue outcomes.

use std::sync::Arc;

/// A completion event: an opaque payload plus the sequence number stamped
/// when it was stored in a queue.
///
/// Events delivered to a callback-only queue are never stored and keep
/// sequence 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    pub payload: P,
    pub(crate) sequence: u64,
}

impl<P> Event<P> {
    #[inline]
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            sequence: 0,
        }
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Handler run synchronously for every event deposited into a queue.
///
/// Runs inside the queue's critical section: it must be short, must not
/// block and must not call back into the queue.
pub type EventCallback<P> = Arc<dyn Fn(&Event<P>) + Send + Sync>;

/// Whether a dequeue consumed the next event or skipped over lost ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueStatus {
    /// Exactly the next event in sequence.
    Clean,
    /// Older events were overwritten before being consumed; `missed` of
    /// them will never be returned.
    Overflow { missed: u64 },
}

/// An event taken from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dequeued<P> {
    pub event: Event<P>,
    pub status: DequeueStatus,
}

impl<P> Dequeued<P> {
    #[inline]
    pub fn is_overflow(&self) -> bool {
        matches!(self.status, DequeueStatus::Overflow { .. })
    }
}

/// An event returned by `poll`, with the index of the queue it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<P> {
    pub event: Event<P>,
    pub status: DequeueStatus,
    pub which: usize,
}

impl<P> Polled<P> {
    pub(crate) fn new(dequeued: Dequeued<P>, which: usize) -> Self {
        Self {
            event: dequeued.event,
            status: dequeued.status,
            which,
        }
    }

    #[inline]
    pub fn is_overflow(&self) -> bool {
        matches!(self.status, DequeueStatus::Overflow { .. })
    }
}

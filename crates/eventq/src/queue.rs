//! Circular event queue.
//!
//! # Sequencing
//!
//! Every stored event is stamped with the queue's enqueue sequence and
//! written to slot `sequence & (capacity - 1)`, overwriting whatever was
//! there. Capacity is kept a power of two so that sequence wrap-around never
//! skips a slot and the queue has the same apparent capacity at all times.
//!
//! The consumer keeps its own dequeue sequence and compares it with the
//! sequence stored in the slot it expects to read next:
//!
//! ```text
//! slot.seq <  deq_seq   nothing new
//! slot.seq == deq_seq   clean consume, deq_seq += 1
//! slot.seq >  deq_seq   overflow: newer event returned, older ones lost
//! ```
//!
//! In every consuming case `deq_seq` is resynchronised to `slot.seq + 1`.
//!
//! # Callback-only queues
//!
//! A queue created with capacity 0 has no storage. Every enqueue runs the
//! callback synchronously, so no event is ever lost, but the queue can not
//! be polled.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corelib::{Error, PartitionRefs, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::{DequeueStatus, Dequeued, Event, EventCallback};
use crate::wait::WaitCoordinator;

/// True if sequence `a` is after `b`, tolerating wrap-around.
#[inline]
pub(crate) fn seq_after(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) > 0
}

struct Ring<P> {
    slots: Box<[Option<Event<P>>]>,
    /// Sequence the next stored event will get.
    enq_seq: u64,
    /// Sequence the consumer expects next.
    deq_seq: u64,
}

/// An event queue bound to a [`WaitCoordinator`].
///
/// Created with [`EventQueue::create`]; shared as `Arc<EventQueue<P>>`
/// between producers and consumers.
pub struct EventQueue<P> {
    capacity: usize,
    ring: Mutex<Ring<P>>,
    callback: Option<EventCallback<P>>,
    refs: PartitionRefs,
    destroyed: AtomicBool,
    waiter: Arc<WaitCoordinator>,
}

impl<P: Clone> EventQueue<P> {
    /// Create a queue with room for `capacity` events.
    ///
    /// `capacity` is rounded up to the next power of two. A capacity of 0
    /// makes a callback-only queue, which requires a callback.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `capacity` is 0 with no callback, or too large
    ///   to round up.
    /// - `ResourceExhausted` if slot storage or reference shards can not be
    ///   allocated. Nothing is left behind.
    pub fn create(
        waiter: &Arc<WaitCoordinator>,
        capacity: usize,
        callback: Option<EventCallback<P>>,
    ) -> Result<Arc<Self>> {
        let capacity = if capacity == 0 {
            0
        } else {
            capacity.checked_next_power_of_two().ok_or_else(|| {
                Error::InvalidArgument(format!("capacity {} too large", capacity))
            })?
        };

        if capacity == 0 && callback.is_none() {
            return Err(Error::InvalidArgument(
                "capacity 0 requires a callback".into(),
            ));
        }

        if capacity != 0 && callback.is_some() {
            warn!(
                capacity,
                "callback already receives every event; storage adds polling overhead"
            );
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            Error::ResourceExhausted(format!("{} event slots: {}", capacity, e))
        })?;
        slots.resize_with(capacity, || None);

        let refs = PartitionRefs::new(waiter.config().partitions)?;

        Ok(Arc::new(Self {
            capacity,
            ring: Mutex::new(Ring {
                slots: slots.into_boxed_slice(),
                enq_seq: 1,
                deq_seq: 1,
            }),
            callback,
            refs,
            destroyed: AtomicBool::new(false),
            waiter: Arc::clone(waiter),
        }))
    }

    /// Deposit an event.
    ///
    /// Returns the sequence stamped on the event, or 0 for a callback-only
    /// queue. Wakes every thread blocked in `poll` on the same coordinator.
    ///
    /// # Errors
    /// `Destroyed` if the queue has been destroyed.
    pub fn enqueue(&self, payload: P) -> Result<u64> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        if self.capacity == 0 {
            let event = Event::new(payload);
            if let Some(callback) = &self.callback {
                callback(&event);
            }
            return Ok(0);
        }

        let sequence = {
            let mut guard = self.ring.lock();
            if self.is_destroyed() {
                return Err(Error::Destroyed);
            }
            let ring = &mut *guard;

            let sequence = ring.enq_seq;
            ring.enq_seq = ring.enq_seq.wrapping_add(1);

            let index = (sequence as usize) & (self.capacity - 1);
            let stored = ring.slots[index].insert(Event { payload, sequence });

            if let Some(callback) = &self.callback {
                callback(&*stored);
            }
            sequence
        };

        self.waiter.wake_all();
        Ok(sequence)
    }

    /// Take the next event without blocking.
    ///
    /// `Ok(None)` means nothing new since the last consume. Callback-only
    /// queues never have anything to dequeue.
    ///
    /// # Errors
    /// `Destroyed` if the queue has been destroyed.
    pub fn dequeue(&self) -> Result<Option<Dequeued<P>>> {
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }
        if self.capacity == 0 {
            return Ok(None);
        }

        let mut ring = self.ring.lock();
        if self.is_destroyed() {
            return Err(Error::Destroyed);
        }

        let deq_seq = ring.deq_seq;
        let index = (deq_seq as usize) & (self.capacity - 1);
        let event = match &ring.slots[index] {
            Some(stored) if !seq_after(deq_seq, stored.sequence) => stored.clone(),
            _ => return Ok(None),
        };

        let status = if event.sequence == deq_seq {
            DequeueStatus::Clean
        } else {
            let missed = event.sequence.wrapping_sub(deq_seq);
            debug!(deq_seq, event_seq = event.sequence, missed, "event queue overflow");
            DequeueStatus::Overflow { missed }
        };

        ring.deq_seq = event.sequence.wrapping_add(1);
        Ok(Some(Dequeued { event, status }))
    }
}

impl<P> EventQueue<P> {
    /// Release the queue's storage once nothing references it.
    ///
    /// Threads blocked in `poll` on this queue are woken and observe
    /// `Destroyed`.
    ///
    /// # Errors
    /// - `Busy` if any partition still holds a reference; the queue is left
    ///   untouched and fully usable.
    /// - `Destroyed` if already destroyed.
    pub fn destroy(&self) -> Result<()> {
        self.refs.retire()?;

        {
            let mut ring = self.ring.lock();
            self.destroyed.store(true, Ordering::Release);
            ring.slots = Box::default();
        }

        debug!(capacity = self.capacity, "event queue destroyed");
        self.waiter.wake_all();
        Ok(())
    }

    /// Register interest on `partition`, blocking `destroy` until released.
    pub fn acquire(&self, partition: usize) -> Result<()> {
        self.refs.acquire(partition)
    }

    pub fn release(&self, partition: usize) {
        self.refs.release(partition)
    }

    /// Register interest on the calling thread's partition, released when
    /// the returned guard drops.
    pub fn hold(self: &Arc<Self>) -> Result<PartitionRef<P>> {
        let partition = self.refs.local();
        self.refs.acquire(partition)?;
        Ok(PartitionRef {
            queue: Arc::clone(self),
            partition,
        })
    }

    /// Outstanding references summed over all partitions.
    pub fn outstanding(&self) -> usize {
        self.refs.total()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Sequence the next stored event will be stamped with.
    pub fn enqueue_sequence(&self) -> u64 {
        self.ring.lock().enq_seq
    }

    /// Sequence the consumer expects next.
    pub fn dequeue_sequence(&self) -> u64 {
        self.ring.lock().deq_seq
    }

    pub(crate) fn waiter(&self) -> &Arc<WaitCoordinator> {
        &self.waiter
    }
}

impl<P> fmt::Debug for EventQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("callback", &self.callback.is_some())
            .field("partitions", &self.refs.partitions())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// A reference held on one partition of an [`EventQueue`].
pub struct PartitionRef<P> {
    queue: Arc<EventQueue<P>>,
    partition: usize,
}

impl<P> PartitionRef<P> {
    pub fn partition(&self) -> usize {
        self.partition
    }
}

impl<P> Drop for PartitionRef<P> {
    fn drop(&mut self) {
        self.queue.release(self.partition);
    }
}

//! Sharded reference counting.
//!
//! Outstanding interest in a shared object is tracked per partition (one
//! shard per concurrency domain) so that threads on different partitions
//! never contend on the same lock or cache line. Retiring the object takes
//! every shard lock at once and fails if any shard is still non-zero.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{Error, Result};

static NEXT_PARTITION: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_PARTITION: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Partition id of the calling thread.
///
/// Threads are assigned round-robin on first use; the id is stable for the
/// lifetime of the thread. Callers reduce it modulo their partition count.
pub fn current_partition() -> usize {
    THREAD_PARTITION.with(|slot| match slot.get() {
        Some(id) => id,
        None => {
            let id = NEXT_PARTITION.fetch_add(1, Ordering::Relaxed);
            slot.set(Some(id));
            id
        }
    })
}

#[derive(Debug, Default)]
struct Shard {
    refs: usize,
    retired: bool,
}

/// Per-partition reference counters.
#[derive(Debug)]
pub struct PartitionRefs {
    shards: Box<[CachePadded<Mutex<Shard>>]>,
}

impl PartitionRefs {
    /// Allocate `partitions` zeroed shards.
    ///
    /// # Errors
    /// `InvalidArgument` for zero partitions, `ResourceExhausted` if the
    /// shard array cannot be allocated.
    pub fn new(partitions: usize) -> Result<Self> {
        if partitions == 0 {
            return Err(Error::InvalidArgument(
                "partition count must be > 0".into(),
            ));
        }

        let mut shards = Vec::new();
        shards.try_reserve_exact(partitions).map_err(|e| {
            Error::ResourceExhausted(format!("{} reference shards: {}", partitions, e))
        })?;
        shards.extend((0..partitions).map(|_| CachePadded::new(Mutex::new(Shard::default()))));

        Ok(Self {
            shards: shards.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn partitions(&self) -> usize {
        self.shards.len()
    }

    /// Partition the calling thread maps to.
    #[inline]
    pub fn local(&self) -> usize {
        current_partition() % self.shards.len()
    }

    #[inline]
    fn shard(&self, partition: usize) -> &Mutex<Shard> {
        &self.shards[partition % self.shards.len()]
    }

    /// Take one reference on `partition`.
    ///
    /// # Errors
    /// `Destroyed` once the counters have been retired.
    pub fn acquire(&self, partition: usize) -> Result<()> {
        let mut shard = self.shard(partition).lock();
        if shard.retired {
            return Err(Error::Destroyed);
        }
        shard.refs += 1;
        Ok(())
    }

    /// Drop one reference on `partition`.
    pub fn release(&self, partition: usize) {
        let mut shard = self.shard(partition).lock();
        if shard.refs == 0 {
            error!(partition, "releasing a reference that was never taken");
            return;
        }
        shard.refs -= 1;
    }

    /// References currently held on `partition`.
    pub fn count(&self, partition: usize) -> usize {
        self.shard(partition).lock().refs
    }

    /// Sum over all partitions. Only a snapshot.
    pub fn total(&self) -> usize {
        self.shards.iter().map(|s| s.lock().refs).sum()
    }

    pub fn is_retired(&self) -> bool {
        self.shards[0].lock().retired
    }

    /// Mark every shard retired if all of them are zero.
    ///
    /// All shard locks are held for the check, so no reference can be
    /// taken between the scan and the retirement.
    ///
    /// # Errors
    /// `Busy` naming the first non-zero partition (nothing is changed), or
    /// `Destroyed` if already retired.
    pub fn retire(&self) -> Result<()> {
        let mut guards: Vec<_> = self.shards.iter().map(|s| s.lock()).collect();

        if guards[0].retired {
            return Err(Error::Destroyed);
        }

        for (partition, shard) in guards.iter().enumerate() {
            if shard.refs != 0 {
                debug!(partition, refs = shard.refs, "busy on retire");
                return Err(Error::Busy {
                    partition,
                    refs: shard.refs,
                });
            }
        }

        for shard in guards.iter_mut() {
            shard.retired = true;
        }
        Ok(())
    }
}

//! Live/dead reference gate embedded in registered objects.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::error;

/// Atomic reference count that can only be revived while non-zero.
///
/// A new counter starts at one: the creator's reference. Once the count
/// drops to zero the object is dead and [`RefCount::get_not_zero`] refuses
/// to hand out new references, even if the object is still reachable.
///
/// # Invariants
///
/// - The count never goes from zero back to non-zero.
/// - `put` on a dead counter is a bug; it is logged and ignored.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicUsize,
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCount {
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    /// Increment the count unless it is zero.
    #[inline]
    pub fn get_not_zero(&self) -> bool {
        self.count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n + 1)
                }
            })
            .is_ok()
    }

    /// Drop a reference. Returns true if this was the last one.
    #[inline]
    pub fn put(&self) -> bool {
        let prev = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1));
        match prev {
            Ok(1) => true,
            Ok(_) => false,
            Err(_) => {
                error!("reference count underflow");
                false
            }
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.count() != 0
    }
}

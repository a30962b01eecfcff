//! Cookie generation.
//!
//! Cookies come from a single counter advanced by an odd stride. An odd
//! stride is coprime with every power of two, so the sequence visits every
//! residue modulo the bucket count before repeating and spreads consecutive
//! registrations across buckets. Zero is reserved and skipped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

/// Step between consecutive cookies.
pub const COOKIE_STRIDE: u64 = 7;

/// Opaque 64-bit reference to a registered object.
///
/// This is the only value meant to cross process or wire boundaries; pass
/// it back to the registry to get the object.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Cookie(pub u64);

impl Cookie {
    /// Never assigned; means "not bound to any object".
    pub const INVALID: Cookie = Cookie(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Lock-free cookie counter.
#[derive(Debug)]
pub struct CookieGenerator {
    base: AtomicU64,
}

impl CookieGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            base: AtomicU64::new(seed),
        }
    }

    /// Seed from the OS random source so cookies differ across restarts.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    /// Next non-zero cookie.
    pub fn next_cookie(&self) -> Cookie {
        loop {
            let cookie = self
                .base
                .fetch_add(COOKIE_STRIDE, Ordering::Relaxed)
                .wrapping_add(COOKIE_STRIDE);
            if cookie != 0 {
                return Cookie(cookie);
            }
            // Zero means "unassigned" everywhere else; step past it.
            warn!("cookie space exhausted: cookie wrap-around");
        }
    }
}

//! Embedded handle record and the capability to carry one.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use corelib::RefCount;
use parking_lot::Mutex;
use tracing::trace;

use crate::cookie::Cookie;
use crate::tag::OwnerTag;

/// Registry bookkeeping embedded in every registrable object.
///
/// The reference count starts at one on behalf of the object's creator.
/// Teardown is two steps: unregister (the cookie stops resolving) and then
/// the creator drops its reference. Lookups already in flight keep the
/// object alive until they release.
#[derive(Debug, Default)]
pub struct Handle {
    cookie: AtomicU64,
    owner: Mutex<Option<OwnerTag>>,
    linked: AtomicBool,
    refs: RefCount,
}

impl Handle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookie assigned at the last registration; `Cookie::INVALID` if never
    /// registered.
    #[inline]
    pub fn cookie(&self) -> Cookie {
        Cookie(self.cookie.load(Ordering::Acquire))
    }

    pub fn owner(&self) -> Option<OwnerTag> {
        *self.owner.lock()
    }

    /// True while the handle is reachable through the registry.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    #[inline]
    pub fn refs(&self) -> &RefCount {
        &self.refs
    }

    /// Drop one reference. Returns true if it was the last one.
    #[inline]
    pub fn put(&self) -> bool {
        self.refs.put()
    }

    /// Mark linked and record the cookie. Fails if already linked.
    pub(crate) fn link(&self, cookie: Cookie, owner: OwnerTag) -> bool {
        if self
            .linked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.cookie.store(cookie.0, Ordering::Release);
        *self.owner.lock() = Some(owner);
        true
    }

    /// Clear the linked flag. Returns whether it was set.
    pub(crate) fn unlink(&self) -> bool {
        self.linked.swap(false, Ordering::AcqRel)
    }
}

/// Capability of objects that can be registered.
///
/// Implement by embedding a [`Handle`] and returning it:
///
/// ```rust
/// use handles::{Handle, Handled};
///
/// struct Export {
///     handle: Handle,
///     client: String,
/// }
///
/// impl Handled for Export {
///     fn handle(&self) -> &Handle {
///         &self.handle
///     }
/// }
/// ```
pub trait Handled: Send + Sync + 'static {
    fn handle(&self) -> &Handle;
}

/// A counted reference obtained from a successful lookup.
///
/// Dereferences to the object. The reference taken by the lookup is
/// dropped when this guard drops, or explicitly with [`Resolved::release`].
pub struct Resolved<T: Handled + ?Sized> {
    object: Arc<T>,
    released: bool,
}

impl<T: Handled + ?Sized> Resolved<T> {
    /// Wrap an object whose count has already been incremented.
    pub(crate) fn new(object: Arc<T>) -> Self {
        Self {
            object,
            released: false,
        }
    }

    pub fn arc(&self) -> &Arc<T> {
        &self.object
    }

    pub fn cookie(&self) -> Cookie {
        self.object.handle().cookie()
    }

    /// Drop the reference now. Returns true if it was the last one, in
    /// which case the caller is responsible for final teardown.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.object.handle().put()
    }
}

impl<T: Handled + ?Sized> Deref for Resolved<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Handled + ?Sized> Drop for Resolved<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.object.handle().put() {
            trace!(cookie = %self.cookie(), "last reference dropped by resolver");
        }
    }
}

impl<T: Handled + ?Sized> fmt::Debug for Resolved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("cookie", &self.cookie())
            .field("refs", &self.object.handle().refs().count())
            .finish()
    }
}

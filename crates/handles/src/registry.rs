//! Cookie-to-object handle table.
//!
//! # Layout
//!
//! A fixed power-of-two table of buckets, each a reader-writer lock over the
//! entries hashed to it by `cookie & (buckets - 1)`:
//!
//! ```text
//! ┌──────────┐
//! │ bucket 0 │ → [entry, entry]
//! │ bucket 1 │ → []
//! │   ...    │
//! │ bucket n │ → [entry]
//! └──────────┘
//! ```
//!
//! # Concurrency Model
//!
//! - `register` / `unregister` take only the target bucket's write lock;
//!   distinct buckets proceed in parallel.
//! - `resolve` takes the bucket's read lock, so lookups on a bucket run
//!   concurrently with each other and only wait out a short unlink.
//! - Entries hold an `Arc` to the object, so unlinking never frees memory a
//!   reader may still be looking at. Liveness is decided by the object's
//!   reference count: a match whose count is already zero is NotFound.
//!
//! # Performance
//!
//! - **register**: O(1) plus a cookie `fetch_add`
//! - **unregister**: O(b) where b = entries in the bucket
//! - **resolve**: O(b), no allocation

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use corelib::{Error, RegistryConfig, Result};
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::cookie::{Cookie, CookieGenerator};
use crate::handle::{Handle, Handled, Resolved};
use crate::tag::OwnerTag;

struct Entry {
    cookie: Cookie,
    owner: OwnerTag,
    object: Arc<dyn Handled>,
    any: Arc<dyn Any + Send + Sync>,
}

impl Entry {
    fn is(&self, handle: &Handle) -> bool {
        std::ptr::eq(self.object.handle(), handle)
    }
}

type Bucket = RwLock<Vec<Entry>>;

/// Maps cookies to registered objects.
pub struct HandleRegistry {
    buckets: Box<[Bucket]>,
    mask: u64,
    cookies: CookieGenerator,
}

impl HandleRegistry {
    /// Allocate the bucket table and seed the cookie generator.
    ///
    /// # Errors
    /// - `InvalidArgument` if the bucket count is not a non-zero power of two.
    /// - `ResourceExhausted` if the table can not be allocated.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let count = config.bucket_count;
        if !count.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "bucket count {} is not a power of two",
                count
            )));
        }

        let mut buckets = Vec::new();
        buckets.try_reserve_exact(count).map_err(|e| {
            Error::ResourceExhausted(format!("{} handle buckets: {}", count, e))
        })?;
        buckets.extend((0..count).map(|_| RwLock::new(Vec::new())));

        let cookies = match config.cookie_seed {
            Some(seed) => CookieGenerator::new(seed),
            None => CookieGenerator::random(),
        };

        debug!(buckets = count, "handle registry initialised");
        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            mask: (count - 1) as u64,
            cookies,
        })
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket(&self, cookie: Cookie) -> &Bucket {
        &self.buckets[(cookie.0 & self.mask) as usize]
    }

    /// Number of linked handles. Only a snapshot.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign a fresh cookie to `object` and make it resolvable.
    ///
    /// # Errors
    /// `InvalidArgument` if the object is already registered or its
    /// reference count has already dropped to zero.
    pub fn register<T: Handled>(&self, object: &Arc<T>, owner: OwnerTag) -> Result<Cookie> {
        let handle = object.handle();
        if handle.is_linked() {
            return Err(Error::InvalidArgument(format!(
                "handle {} already registered",
                handle.cookie()
            )));
        }
        if !handle.refs().is_live() {
            return Err(Error::InvalidArgument(
                "registering an object with no references".into(),
            ));
        }

        let cookie = self.cookies.next_cookie();

        let mut bucket = self.bucket(cookie).write();
        if !handle.link(cookie, owner) {
            return Err(Error::InvalidArgument(format!(
                "handle {} already registered",
                handle.cookie()
            )));
        }
        bucket.push(Entry {
            cookie,
            owner,
            object: Arc::clone(object) as Arc<dyn Handled>,
            any: Arc::clone(object) as Arc<dyn Any + Send + Sync>,
        });
        drop(bucket);

        debug!(cookie = %cookie, owner = %owner, "added object to handle table");
        Ok(cookie)
    }

    /// Make the handle unreachable by cookie. Idempotent.
    ///
    /// Does not touch the reference count; the creator still owns its
    /// reference. Returns true if this call removed the handle.
    pub fn unregister(&self, handle: &Handle) -> bool {
        let cookie = handle.cookie();
        if !cookie.is_valid() {
            error!("removing a handle that was never registered");
            return false;
        }

        let mut bucket = self.bucket(cookie).write();
        if !handle.is_linked() {
            error!(cookie = %cookie, "removing an already-removed handle");
            return false;
        }

        let Some(idx) = bucket
            .iter()
            .position(|e| e.cookie == cookie && e.is(handle))
        else {
            // Linked, but into some other registry.
            error!(cookie = %cookie, "removing a handle this table does not hold");
            return false;
        };
        bucket.swap_remove(idx);
        handle.unlink();
        drop(bucket);

        debug!(cookie = %cookie, "removed object from handle table");
        true
    }

    /// Look up a live object by cookie and owner.
    ///
    /// On success the object's reference count has been incremented and the
    /// returned guard releases it.
    ///
    /// # Errors
    /// `NotFound` if no linked handle matches both keys, or if the match is
    /// already being torn down (count zero).
    pub fn resolve(&self, cookie: Cookie, owner: OwnerTag) -> Result<Resolved<dyn Handled>> {
        self.lookup(cookie, owner, |entry| Some(Arc::clone(&entry.object)))
    }

    /// Like [`resolve`](Self::resolve), but also requires the object to be a
    /// `T`. A type mismatch is `NotFound` and takes no reference.
    pub fn resolve_as<T: Handled>(&self, cookie: Cookie, owner: OwnerTag) -> Result<Resolved<T>> {
        self.lookup(cookie, owner, |entry| {
            Arc::clone(&entry.any).downcast::<T>().ok()
        })
    }

    fn lookup<T, F>(&self, cookie: Cookie, owner: OwnerTag, pick: F) -> Result<Resolved<T>>
    where
        T: Handled + ?Sized,
        F: FnOnce(&Entry) -> Option<Arc<T>>,
    {
        let not_found = Error::NotFound { cookie: cookie.0 };
        if !cookie.is_valid() {
            return Err(not_found);
        }

        let bucket = self.bucket(cookie).read();
        let entry = bucket
            .iter()
            .find(|e| e.cookie == cookie && e.owner == owner)
            .ok_or_else(|| not_found.clone())?;
        let object = pick(entry).ok_or_else(|| not_found.clone())?;

        if !object.handle().refs().get_not_zero() {
            trace!(cookie = %cookie, "matched handle is being torn down");
            return Err(not_found);
        }
        drop(bucket);

        trace!(
            cookie = %cookie,
            owner = %owner,
            refs = object.handle().refs().count(),
            "resolved handle"
        );
        Ok(Resolved::new(object))
    }

    /// Force-unregister every remaining handle and release the table.
    ///
    /// Returns the number of leaked handles; each is logged.
    pub fn shutdown(self) -> usize {
        self.cleanup_all()
    }

    fn cleanup_all(&self) -> usize {
        let mut leaked = 0;
        for bucket in self.buckets.iter() {
            let mut entries = bucket.write();
            for entry in entries.drain(..) {
                error!(
                    cookie = %entry.cookie,
                    owner = %entry.owner,
                    "force clean handle"
                );
                entry.object.handle().unlink();
                leaked += 1;
            }
        }

        if leaked != 0 {
            error!(leaked, "handle count at cleanup");
        }
        leaked
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lock {
        handle: Handle,
        mode: u32,
    }

    impl Handled for Lock {
        fn handle(&self) -> &Handle {
            &self.handle
        }
    }

    struct Export {
        handle: Handle,
    }

    impl Handled for Export {
        fn handle(&self) -> &Handle {
            &self.handle
        }
    }

    fn registry() -> HandleRegistry {
        HandleRegistry::new(&RegistryConfig::with_buckets(16).seeded(1)).unwrap()
    }

    fn lock(mode: u32) -> Arc<Lock> {
        Arc::new(Lock {
            handle: Handle::new(),
            mode,
        })
    }

    #[test]
    fn test_bucket_count_validation() {
        for bad in [0, 3, 12] {
            let err = HandleRegistry::new(&RegistryConfig::with_buckets(bad)).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
        assert_eq!(registry().bucket_count(), 16);
    }

    #[test]
    fn test_seeded_cookies() {
        let reg = registry();
        let tag = OwnerTag::new("lock");
        assert_eq!(reg.register(&lock(0), tag).unwrap(), Cookie(8));
        assert_eq!(reg.register(&lock(0), tag).unwrap(), Cookie(15));
    }

    #[test]
    fn test_double_register_rejected() {
        let reg = registry();
        let tag = OwnerTag::new("lock");
        let obj = lock(1);
        let cookie = reg.register(&obj, tag).unwrap();

        assert!(matches!(
            reg.register(&obj, tag),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(obj.handle().cookie(), cookie);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_reregister_after_unregister() {
        let reg = registry();
        let tag = OwnerTag::new("lock");
        let obj = lock(1);
        let first = reg.register(&obj, tag).unwrap();
        assert!(reg.unregister(obj.handle()));

        let second = reg.register(&obj, tag).unwrap();
        assert_ne!(first, second);
        assert!(reg.resolve(first, tag).is_err());
        assert!(reg.resolve(second, tag).is_ok());
    }

    #[test]
    fn test_resolve_as_checks_type() {
        let reg = registry();
        let tag = OwnerTag::new("shared");
        let obj = lock(5);
        let cookie = reg.register(&obj, tag).unwrap();

        let got = reg.resolve_as::<Lock>(cookie, tag).unwrap();
        assert_eq!(got.mode, 5);
        drop(got);

        assert_eq!(
            reg.resolve_as::<Export>(cookie, tag).unwrap_err(),
            Error::NotFound { cookie: cookie.0 }
        );
        // The failed typed lookup took no reference.
        assert_eq!(obj.handle().refs().count(), 1);

        let export = Arc::new(Export {
            handle: Handle::new(),
        });
        let cookie = reg.register(&export, tag).unwrap();
        assert!(reg.resolve_as::<Export>(cookie, tag).is_ok());
    }

    #[test]
    fn test_dead_object_not_registrable() {
        let reg = registry();
        let obj = lock(0);
        assert!(obj.handle().put());
        assert!(matches!(
            reg.register(&obj, OwnerTag::new("lock")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_drop_cleans_up() {
        let obj = lock(0);
        {
            let reg = registry();
            reg.register(&obj, OwnerTag::new("lock")).unwrap();
        }
        assert!(!obj.handle().is_linked());
        assert_eq!(Arc::strong_count(&obj), 1);
    }
}

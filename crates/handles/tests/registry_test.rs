//! Integration tests for the handle registry.
//!
//! # Test Strategy
//!
//! 1. **Basic functionality**: register/resolve/unregister
//! 2. **Edge cases**: wrong owner, invalid cookie, double unregister
//! 3. **Shutdown**: leak accounting
//! 4. **Thread safety**: lookups racing teardown

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use corelib::{Error, RegistryConfig};
use handles::{Cookie, Handle, HandleRegistry, Handled, OwnerTag};

struct Connection {
    handle: Handle,
    peer: &'static str,
    freed: AtomicBool,
}

impl Connection {
    fn new(peer: &'static str) -> Arc<Self> {
        Arc::new(Self {
            handle: Handle::new(),
            peer,
            freed: AtomicBool::new(false),
        })
    }

    /// Drop a reference; the last one marks the connection freed.
    fn put(&self) {
        if self.handle.put() {
            self.freed.store(true, Ordering::SeqCst);
        }
    }
}

impl Handled for Connection {
    fn handle(&self) -> &Handle {
        &self.handle
    }
}

fn registry(buckets: usize) -> HandleRegistry {
    HandleRegistry::new(&RegistryConfig::with_buckets(buckets)).unwrap()
}

// ============================================================================
// Basic Functionality Tests
// ============================================================================

#[test]
fn test_register_then_resolve() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    let conn = Connection::new("10.0.0.1@tcp");

    let cookie = reg.register(&conn, tag).unwrap();
    assert!(cookie.is_valid());
    assert!(conn.handle().is_linked());
    assert_eq!(conn.handle().cookie(), cookie);
    assert_eq!(conn.handle().owner(), Some(tag));

    let before = conn.handle().refs().count();
    let found = reg.resolve_as::<Connection>(cookie, tag).unwrap();
    assert!(Arc::ptr_eq(found.arc(), &conn));
    assert_eq!(found.peer, "10.0.0.1@tcp");
    assert_eq!(conn.handle().refs().count(), before + 1);

    drop(found);
    assert_eq!(conn.handle().refs().count(), before);
}

#[test]
fn test_untyped_resolve() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    let conn = Connection::new("peer");
    let cookie = reg.register(&conn, tag).unwrap();

    let found = reg.resolve(cookie, tag).unwrap();
    assert_eq!(found.handle().cookie(), cookie);
    assert_eq!(found.cookie(), cookie);
}

#[test]
fn test_unregister_makes_unreachable() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    let conn = Connection::new("peer");
    let cookie = reg.register(&conn, tag).unwrap();

    assert!(reg.unregister(conn.handle()));
    assert!(!conn.handle().is_linked());
    assert_eq!(
        reg.resolve(cookie, tag).unwrap_err(),
        Error::NotFound { cookie: cookie.0 }
    );
    // Unregister leaves the creator's reference alone.
    assert_eq!(conn.handle().refs().count(), 1);
    assert!(reg.is_empty());
}

#[test]
fn test_many_objects_share_buckets() {
    let reg = registry(4);
    let tag = OwnerTag::new("connection");
    let conns: Vec<_> = (0..100).map(|_| Connection::new("peer")).collect();
    let cookies: Vec<_> = conns
        .iter()
        .map(|c| reg.register(c, tag).unwrap())
        .collect();
    assert_eq!(reg.len(), 100);

    for (conn, cookie) in conns.iter().zip(&cookies) {
        let found = reg.resolve_as::<Connection>(*cookie, tag).unwrap();
        assert!(Arc::ptr_eq(found.arc(), conn));
    }
}

// ============================================================================
// Edge Cases
// ============================================================================

#[test]
fn test_wrong_owner_is_not_found() {
    let reg = registry(64);
    let conn = Connection::new("peer");
    let cookie = reg.register(&conn, OwnerTag::new("connection")).unwrap();

    assert_eq!(
        reg.resolve(cookie, OwnerTag::new("export")).unwrap_err(),
        Error::NotFound { cookie: cookie.0 }
    );
    assert_eq!(conn.handle().refs().count(), 1);
}

#[test]
fn test_invalid_and_unknown_cookies() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    assert!(reg.resolve(Cookie::INVALID, tag).is_err());
    assert!(reg.resolve(Cookie(12345), tag).is_err());
}

#[test]
fn test_double_unregister_is_noop() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    let keep = Connection::new("keep");
    let drop_me = Connection::new("drop");
    let keep_cookie = reg.register(&keep, tag).unwrap();
    reg.register(&drop_me, tag).unwrap();

    assert!(reg.unregister(drop_me.handle()));
    assert!(!reg.unregister(drop_me.handle()));
    // Never registered.
    assert!(!reg.unregister(&Handle::new()));

    assert_eq!(reg.len(), 1);
    assert!(reg.resolve(keep_cookie, tag).is_ok());
}

#[test]
fn test_unregister_from_wrong_registry_is_rejected() {
    let home = registry(64);
    let other = registry(64);
    let tag = OwnerTag::new("connection");
    let conn = Connection::new("peer");
    let cookie = home.register(&conn, tag).unwrap();

    assert!(!other.unregister(conn.handle()));
    assert!(conn.handle().is_linked());
    assert!(home.resolve(cookie, tag).is_ok());

    // Still owned by `home`, so it cannot be linked a second time.
    assert!(matches!(
        other.register(&conn, tag),
        Err(Error::InvalidArgument(_))
    ));
    assert!(other.is_empty());

    assert!(home.unregister(conn.handle()));
    assert!(!conn.handle().is_linked());
    assert!(home.resolve(cookie, tag).is_err());
}

#[test]
fn test_dead_object_does_not_resolve() {
    let reg = registry(64);
    let tag = OwnerTag::new("connection");
    let conn = Connection::new("peer");
    let cookie = reg.register(&conn, tag).unwrap();

    // Teardown won the race: still linked, but no references left.
    conn.put();
    assert!(conn.handle().is_linked());
    assert!(reg.resolve(cookie, tag).is_err());
    assert_eq!(conn.handle().refs().count(), 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_reports_leaks() {
    let reg = registry(16);
    let tag = OwnerTag::new("connection");
    let conns: Vec<_> = (0..5).map(|_| Connection::new("peer")).collect();
    for c in &conns {
        reg.register(c, tag).unwrap();
    }
    reg.unregister(conns[0].handle());

    assert_eq!(reg.shutdown(), 4);
    assert!(conns.iter().all(|c| !c.handle().is_linked()));
    assert!(conns.iter().all(|c| Arc::strong_count(c) == 1));
}

#[test]
fn test_clean_shutdown() {
    let reg = registry(16);
    assert_eq!(reg.shutdown(), 0);
}

// ============================================================================
// Thread Safety
// ============================================================================

#[test]
fn test_resolve_racing_teardown_never_sees_freed_object() {
    for _ in 0..50 {
        let reg = Arc::new(registry(8));
        let tag = OwnerTag::new("connection");
        let conn = Connection::new("peer");
        let cookie = reg.register(&conn, tag).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let hits = Arc::clone(&hits);
                thread::spawn(move || {
                    for _ in 0..500 {
                        match reg.resolve_as::<Connection>(cookie, tag) {
                            Ok(found) => {
                                assert!(!found.freed.load(Ordering::SeqCst));
                                hits.fetch_add(1, Ordering::Relaxed);
                                let conn = Arc::clone(found.arc());
                                if found.release() {
                                    conn.freed.store(true, Ordering::SeqCst);
                                }
                            }
                            Err(err) => assert_eq!(err, Error::NotFound { cookie: cookie.0 }),
                        }
                    }
                })
            })
            .collect();

        thread::yield_now();
        reg.unregister(conn.handle());
        conn.put();

        for r in readers {
            r.join().unwrap();
        }

        assert!(conn.freed.load(Ordering::SeqCst));
        assert!(reg.resolve(cookie, tag).is_err());
    }
}

#[test]
fn test_concurrent_register_unregister() {
    let reg = Arc::new(registry(32));
    let tag = OwnerTag::new("connection");

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                for _ in 0..200 {
                    let conn = Connection::new("peer");
                    let cookie = reg.register(&conn, tag).unwrap();
                    let found = reg.resolve_as::<Connection>(cookie, tag).unwrap();
                    assert!(Arc::ptr_eq(found.arc(), &conn));
                    drop(found);
                    assert!(reg.unregister(conn.handle()));
                    conn.put();
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    assert!(reg.is_empty());
}

//! Handle registry: transmissible, type-checked references to in-memory
//! objects.
//!
//! Objects embed a [`Handle`] and implement [`Handled`]. Registering one
//! yields a 64-bit [`Cookie`] that can be stored or sent anywhere and later
//! resolved back to the object, as long as the object is still registered
//! and alive.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use corelib::RegistryConfig;
//! use handles::{Handle, Handled, HandleRegistry, OwnerTag};
//!
//! struct Request {
//!     handle: Handle,
//!     xid: u64,
//! }
//!
//! impl Handled for Request {
//!     fn handle(&self) -> &Handle {
//!         &self.handle
//!     }
//! }
//!
//! let registry = HandleRegistry::new(&RegistryConfig::with_buckets(64)).unwrap();
//! let tag = OwnerTag::new("request");
//! let req = Arc::new(Request { handle: Handle::new(), xid: 42 });
//!
//! let cookie = registry.register(&req, tag).unwrap();
//! let found = registry.resolve_as::<Request>(cookie, tag).unwrap();
//! assert_eq!(found.xid, 42);
//! drop(found);
//!
//! registry.unregister(req.handle());
//! assert!(registry.resolve(cookie, tag).is_err());
//! assert_eq!(registry.shutdown(), 0);
//! ```

pub mod cookie;
pub mod handle;
pub mod registry;
pub mod tag;

pub use cookie::{Cookie, CookieGenerator, COOKIE_STRIDE};
pub use handle::{Handle, Handled, Resolved};
pub use registry::HandleRegistry;
pub use tag::OwnerTag;

//! Core library shared by the event queue and handle registry crates.
//!
//! This crate provides the pieces both completion-notification and
//! handle-resolution paths rely on:
//! - Error taxonomy and `Result` alias
//! - Configuration (serde, JSON)
//! - Per-partition sharded reference counters
//! - The live/dead reference gate embedded in registered objects

pub mod config;
pub mod error;
pub mod partition;
pub mod refcount;

pub use config::{Config, EventQueueConfig, RegistryConfig};
pub use error::{Error, Result};
pub use partition::{current_partition, PartitionRefs};
pub use refcount::RefCount;

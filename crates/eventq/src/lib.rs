//! Event queues for delivering completion events from asynchronous network
//! operations.
//!
//! This crate provides:
//! - Circular, sequence-numbered event queues with lossy polling
//! - Callback-only queues with loss-free synchronous delivery
//! - A wait coordinator that lets one caller block across many queues
//!
//! # Example
//!
//! ```rust
//! use corelib::EventQueueConfig;
//! use eventq::{EventQueue, Timeout, WaitCoordinator};
//!
//! let waiter = WaitCoordinator::new(EventQueueConfig::default()).unwrap();
//! let eq = EventQueue::create(&waiter, 8, None).unwrap();
//!
//! eq.enqueue("put-ack").unwrap();
//! let polled = waiter.poll(&[Some(&*eq)], Timeout::NoWait).unwrap().unwrap();
//! assert_eq!(polled.event.payload, "put-ack");
//! assert_eq!(polled.which, 0);
//! ```

pub mod event;
pub mod poll;
pub mod queue;
pub mod wait;

pub use event::{DequeueStatus, Dequeued, Event, EventCallback, Polled};
pub use queue::{EventQueue, PartitionRef};
pub use wait::{Timeout, WaitCoordinator};

//! CLI tool for exercising event queues and the handle registry.
//!
//! Provides commands for:
//! - Stressing an event queue with concurrent producers and a poller
//! - Racing handle lookups against teardown
//! - Printing the effective configuration

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;

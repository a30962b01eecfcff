//! Configuration for event queues and the handle registry.
//!
//! All structs deserialize with defaults for any missing field, so a partial
//! JSON document (or `{}`) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of buckets in the handle table.
pub const DEFAULT_BUCKET_COUNT: usize = 1 << 16;

/// Event queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventQueueConfig {
    /// Number of reference-count shards per queue (one per concurrency domain).
    pub partitions: usize,
}

impl Default for EventQueueConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
        }
    }
}

impl EventQueueConfig {
    pub fn with_partitions(partitions: usize) -> Self {
        Self { partitions }
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(Error::Config("event_queue.partitions must be > 0".into()));
        }
        Ok(())
    }
}

/// Handle registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of hash buckets; must be a non-zero power of two.
    pub bucket_count: usize,
    /// Fixed cookie seed. `None` seeds from the OS random source.
    pub cookie_seed: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            cookie_seed: None,
        }
    }
}

impl RegistryConfig {
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self {
            bucket_count,
            ..Self::default()
        }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.cookie_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.bucket_count.is_power_of_two() {
            return Err(Error::Config(format!(
                "registry.bucket_count must be a power of two, got {}",
                self.bucket_count
            )));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub event_queue: EventQueueConfig,
    pub registry: RegistryConfig,
}

impl Config {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.event_queue.validate()?;
        self.registry.validate()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

fn default_partitions() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

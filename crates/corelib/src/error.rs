//! Error types shared by the event queue and handle registry crates.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the completion and handle paths.
///
/// `Busy` is a routine outcome: the caller is expected to retry once the
/// outstanding references are released. Lost events are not reported here;
/// they travel with the dequeued event as an overflow status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad argument (capacity/callback combination, double register, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failed while creating a queue or registry.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A partition still holds references to the object being destroyed.
    #[error("busy: partition {partition} holds {refs} reference(s)")]
    Busy { partition: usize, refs: usize },

    /// A poll list contained an empty entry.
    #[error("invalid handle at poll index {index}")]
    InvalidHandle { index: usize },

    /// The event queue has been destroyed.
    #[error("event queue destroyed")]
    Destroyed,

    /// No live handle matches the cookie and owner.
    #[error("no live handle for cookie {cookie:#x}")]
    NotFound { cookie: u64 },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for outcomes that a caller should simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

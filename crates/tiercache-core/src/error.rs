//! Error types for TierCache
//!
//! This module defines the common error type used throughout the system.

use thiserror::Error;

/// Common result type for TierCache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for TierCache
#[derive(Debug, Error)]
pub enum Error {
    /// Legitimate cache miss, distinguished from all other failures so a
    /// hierarchy can consult the next tier instead of aborting.
    #[error("requested data not found in cache")]
    NotFound,

    /// A stream delivered a different number of bytes than it declared.
    #[error("read size mismatch ({actual} != {expected})")]
    SizeMismatch { expected: u64, actual: u64 },

    /// A child registered with a hierarchy satisfies neither the read nor
    /// the write capability.
    #[error("child store is neither readable nor writable")]
    NoCapability,

    /// Per-call metadata did not have the shape a store requires.
    #[error("invalid metadata: expected {expected}")]
    InvalidMetadata { expected: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create an upstream transport error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NotFound => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            e @ Error::SizeMismatch { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e)
            }
            other => std::io::Error::other(other),
        }
    }
}

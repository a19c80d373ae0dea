//! Cache client error types

use thiserror::Error;

/// Cache client errors
///
/// `MalformedDescriptor` and `HandshakeFailed` are raised only while connecting.
/// `Serialization` is raised before any round-trip is attempted. Everything else
/// is an operation-level failure surfaced to the caller without retry.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Malformed connection descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Handshake with cache store failed: {0}")]
    HandshakeFailed(String),

    #[error("Redis error: {0}")]
    Store(String),

    #[error("Cache operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Cache operation cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Whether this error was produced while establishing the connection
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::MalformedDescriptor(_) | Self::HandshakeFailed(_))
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

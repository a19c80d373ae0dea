//! # kvcache Client Library
//!
//! Typed cache client for a Redis-compatible key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  SharedCache (Arc<dyn CacheStore>)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CacheStore trait                          │
//! │   scalar · hash · keys · TTL · raw (caller-scoped) writes    │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │       RedisCache        │   │         MemoryCache          │
//! │  (20s bounded calls)    │   │   (tests, local fallback)    │
//! └─────────────────────────┘   └──────────────────────────────┘
//!              │
//!              ▼
//! ┌─────────────────────────┐
//! │     RedisConnector      │
//! │ (parse DSN, 10s PING)   │
//! └─────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `redis`: Enable the Redis backend (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kvcache_client::{CacheStore, CacheValue, Ttl};
//!
//! let cache = kvcache_client::connect("redis://127.0.0.1:6379").await?;
//!
//! cache.set("pi", &CacheValue::from(3.14159), Ttl::secs(60)).await?;
//! assert_eq!(cache.get("pi").await.as_deref(), Some("3.142"));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod codec;
#[cfg(feature = "redis")]
pub mod connection;
pub mod error;
pub mod memory;
pub mod ttl;

// Re-export commonly used types
pub use client::{CacheStore, OPERATION_TIMEOUT, SharedCache, shared_cache};
#[cfg(feature = "redis")]
pub use client::RedisCache;
pub use codec::CacheValue;
#[cfg(feature = "redis")]
pub use connection::{ConnectionConfig, HANDSHAKE_TIMEOUT, RedisConnector};
pub use error::{CacheError, Result};
pub use memory::MemoryCache;
pub use ttl::{KeyTtl, Ttl};

pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect with the given descriptor and return a shareable cache client
///
/// # Errors
///
/// Returns a connection error if the descriptor is malformed or the store
/// does not answer the handshake.
#[cfg(feature = "redis")]
pub async fn connect(dsn: &str) -> Result<SharedCache> {
    let connector = RedisConnector::connect(ConnectionConfig::new(dsn)).await?;
    Ok(shared_cache(connector.cache()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_connect_rejects_malformed_descriptor() {
        let err = connect("not a redis url").await.err().unwrap();
        assert!(matches!(err, CacheError::MalformedDescriptor(_)), "{err}");
    }
}

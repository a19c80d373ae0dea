//! # Cache Client
//!
//! The [`CacheStore`] capability and its Redis implementation.
//!
//! Every operation is one round-trip on the shared connection. Operations
//! without a caller scope are bounded by [`OPERATION_TIMEOUT`]; the `*_raw`,
//! `expire` and `get_ttl` operations run until their [`CancellationToken`]
//! fires instead. Nothing is retried.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::codec::CacheValue;
use crate::error::Result;
use crate::ttl::{KeyTtl, Ttl};

#[cfg(feature = "redis")]
use crate::{error::CacheError, ttl::duration_millis};
#[cfg(feature = "redis")]
use redis::{AsyncCommands, RedisResult, aio::ConnectionManager};
#[cfg(feature = "redis")]
use std::future::Future;

/// Bound on every operation that does not take a caller scope
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Typed operation surface over a key-value store with TTLs and hashes
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// All keys matching a glob pattern, in one blocking `KEYS` call
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Same as [`CacheStore::keys`]
    async fn get_keys_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        self.keys(pattern).await
    }

    /// All keys matching a glob pattern, walked incrementally with `SCAN`.
    ///
    /// Does not block the store for the whole enumeration. Keys written or
    /// removed during the walk may or may not be reported.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Encode `value` and write it with the given expiration policy
    async fn set(&self, key: &str, value: &CacheValue, ttl: Ttl) -> Result<()>;

    /// Write pre-serialized bytes as-is, returning the store's acknowledgement
    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Ttl) -> Result<String>;

    /// Read the raw stored string; `Ok(None)` when the key is absent
    async fn try_get(&self, key: &str) -> Result<Option<String>>;

    /// Read the raw stored string, logging and swallowing any error.
    ///
    /// `None` covers both "absent" and "store failed"; use
    /// [`CacheStore::try_get`] to tell them apart.
    async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "Cache get failed");
                None
            }
        }
    }

    async fn is_existed(&self, key: &str) -> Result<bool>;

    async fn is_hexisted(&self, list_key: &str, field: &str) -> Result<bool>;

    /// One field of a hash; `Ok(None)` when the field or hash is absent
    async fn hget(&self, list_key: &str, field: &str) -> Result<Option<String>>;

    async fn hgetall(&self, list_key: &str) -> Result<HashMap<String, String>>;

    /// Write one or more field/value pairs in a single `HSET`.
    ///
    /// Existing fields are overwritten, other fields are left alone and the
    /// hash's expiration is not touched.
    async fn hset(&self, list_key: &str, values: &[(&str, &str)]) -> Result<()>;

    /// Delete all listed keys in one call
    async fn del(&self, keys: &[String]) -> Result<()>;

    /// Remove fields from a hash; absent fields are ignored
    async fn hdel(&self, list_key: &str, fields: &[&str]) -> Result<()>;

    /// Overwrite a string value, keeping the key's current expiration
    async fn set_raw(&self, scope: &CancellationToken, key: &str, value: &str) -> Result<()>;

    async fn hset_raw(
        &self,
        scope: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()>;

    /// Set or replace the expiration of a key without touching its value.
    ///
    /// Returns `false` when the key does not exist. A zero duration deletes
    /// the key.
    async fn expire(&self, scope: &CancellationToken, key: &str, ttl: Duration) -> Result<bool>;

    async fn get_ttl(&self, scope: &CancellationToken, key: &str) -> Result<KeyTtl>;
}

/// Cache capability shared across handlers and tasks
pub type SharedCache = Arc<dyn CacheStore>;

/// Wrap a store for sharing
pub fn shared_cache<C: CacheStore + 'static>(cache: C) -> SharedCache {
    Arc::new(cache)
}

/// Redis-backed cache client
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(OPERATION_TIMEOUT, fut).await {
            Ok(reply) => reply.map_err(CacheError::from),
            Err(_) => {
                let timeout_ms = duration_millis(OPERATION_TIMEOUT);
                tracing::warn!(op, timeout_ms, "Cache operation timed out");
                Err(CacheError::Timeout { timeout_ms })
            }
        }
    }

    async fn scoped<T>(
        &self,
        op: &'static str,
        scope: &CancellationToken,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T> {
        tokio::select! {
            biased;
            () = scope.cancelled() => {
                tracing::warn!(op, "Cache operation cancelled");
                Err(CacheError::Cancelled)
            }
            reply = fut => reply.map_err(CacheError::from),
        }
    }

    fn set_cmd(key: &str, value: &[u8], ttl: Ttl) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        ttl.write_set_args(&mut cmd);
        cmd
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheStore for RedisCache {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        self.bounded("keys", conn.keys(pattern)).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let walk = async move {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok::<_, redis::RedisError>(keys)
        };

        let mut keys = self.bounded("scan_keys", walk).await?;
        // SCAN may report a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn set(&self, key: &str, value: &CacheValue, ttl: Ttl) -> Result<()> {
        let encoded = value.encode();
        let cmd = Self::set_cmd(key, encoded.as_bytes(), ttl);
        let mut conn = self.conn.clone();

        let result: Result<()> = self.bounded("set", cmd.query_async(&mut conn)).await;
        if let Err(e) = &result {
            tracing::error!(key, error = %e, "Cache set failed");
        }
        result
    }

    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Ttl) -> Result<String> {
        let cmd = Self::set_cmd(key, value, ttl);
        let mut conn = self.conn.clone();
        self.bounded("set_ttl", cmd.query_async(&mut conn)).await
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("get", conn.get(key)).await
    }

    async fn is_existed(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = self.bounded("exists", conn.exists(key)).await?;
        Ok(count > 0)
    }

    async fn is_hexisted(&self, list_key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        self.bounded("hexists", conn.hexists(list_key, field)).await
    }

    async fn hget(&self, list_key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("hget", conn.hget(list_key, field)).await
    }

    async fn hgetall(&self, list_key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        self.bounded("hgetall", conn.hgetall(list_key)).await
    }

    async fn hset(&self, list_key: &str, values: &[(&str, &str)]) -> Result<()> {
        if values.is_empty() {
            return Err(CacheError::InvalidArgument(
                "hset needs at least one field/value pair".to_string(),
            ));
        }
        let mut conn = self.conn.clone();
        self.bounded("hset", conn.hset_multiple(list_key, values)).await
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        self.bounded("del", conn.del(keys)).await
    }

    async fn hdel(&self, list_key: &str, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        self.bounded("hdel", conn.hdel(list_key, fields)).await
    }

    async fn set_raw(&self, scope: &CancellationToken, key: &str, value: &str) -> Result<()> {
        let cmd = Self::set_cmd(key, value.as_bytes(), Ttl::Keep);
        let mut conn = self.conn.clone();
        self.scoped("set_raw", scope, cmd.query_async(&mut conn)).await
    }

    async fn hset_raw(
        &self,
        scope: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        self.scoped("hset_raw", scope, conn.hset(key, field, value)).await
    }

    async fn expire(&self, scope: &CancellationToken, key: &str, ttl: Duration) -> Result<bool> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(duration_millis(ttl));
        let mut conn = self.conn.clone();
        self.scoped("expire", scope, cmd.query_async(&mut conn)).await
    }

    async fn get_ttl(&self, scope: &CancellationToken, key: &str) -> Result<KeyTtl> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let mut conn = self.conn.clone();
        let reply: i64 = self.scoped("get_ttl", scope, cmd.query_async(&mut conn)).await?;
        Ok(KeyTtl::from_pttl(reply))
    }
}

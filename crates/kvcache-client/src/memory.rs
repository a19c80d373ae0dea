//! # In-Memory Cache
//!
//! Process-local [`CacheStore`] with the same TTL, keep-TTL, hash and
//! pattern semantics as Redis. Used as a test double and as a stand-in
//! backend where no store is available.
//!
//! Time is read from `tokio::time`, so tests can pause and advance it.

use async_trait::async_trait;
use glob::Pattern;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::CacheStore;
use crate::codec::CacheValue;
use crate::error::{CacheError, Result};
use crate::ttl::{KeyTtl, Ttl};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Stored {
    Str(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Keyspace guarded by a single lock; expired entries are dropped lazily
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn write_str(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: Vec<u8>,
        ttl: Ttl,
    ) {
        let now = Instant::now();
        let expires_at = match ttl.normalized() {
            Ttl::Keep => live(entries, key, now).and_then(|e| e.expires_at),
            other => other
                .expire_millis()
                .and_then(|ms| deadline(now, Duration::from_millis(ms))),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Str(value),
                expires_at,
            },
        );
    }

    fn hash_mut<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<&'a mut HashMap<String, String>> {
        let now = Instant::now();
        if live(entries, key, now).is_none() {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Stored::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Stored::Hash(fields)) => Ok(fields),
            _ => Err(CacheError::Store(WRONGTYPE.to_string())),
        }
    }

    fn hash_ref<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<Option<&'a HashMap<String, String>>> {
        match live(entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(None),
            Some(Stored::Hash(fields)) => Ok(Some(fields)),
            Some(Stored::Str(_)) => Err(CacheError::Store(WRONGTYPE.to_string())),
        }
    }

    fn matching_keys(entries: &mut HashMap<String, Entry>, pattern: &str) -> Result<Vec<String>> {
        // Redis negates classes with `[^..]`, glob with `[!..]`
        let pattern = Pattern::new(&pattern.replace("[^", "[!"))
            .map_err(|e| CacheError::InvalidArgument(format!("bad key pattern: {e}")))?;

        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

/// Live entry for `key`, evicting it first if it has expired
fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

/// Expiry instant for `ttl`; `None` (never expires) past the clock's range
fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

fn check_scope(scope: &CancellationToken, op: &'static str) -> Result<()> {
    if scope.is_cancelled() {
        tracing::warn!(op, "Cache operation cancelled");
        return Err(CacheError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().await;
        Self::matching_keys(&mut entries, pattern)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.keys(pattern).await
    }

    async fn set(&self, key: &str, value: &CacheValue, ttl: Ttl) -> Result<()> {
        let encoded = value.encode().into_bytes();
        let mut entries = self.entries.lock().await;
        Self::write_str(&mut entries, key, encoded, ttl);
        Ok(())
    }

    async fn set_ttl(&self, key: &str, value: &[u8], ttl: Ttl) -> Result<String> {
        let mut entries = self.entries.lock().await;
        Self::write_str(&mut entries, key, value.to_vec(), ttl);
        Ok("OK".to_string())
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(None),
            Some(Stored::Str(bytes)) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| CacheError::Store(format!("stored value is not UTF-8: {e}"))),
            Some(Stored::Hash(_)) => Err(CacheError::Store(WRONGTYPE.to_string())),
        }
    }

    async fn is_existed(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, Instant::now()).is_some())
    }

    async fn is_hexisted(&self, list_key: &str, field: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(Self::hash_ref(&mut entries, list_key)?.is_some_and(|h| h.contains_key(field)))
    }

    async fn hget(&self, list_key: &str, field: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::hash_ref(&mut entries, list_key)?.and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, list_key: &str) -> Result<HashMap<String, String>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::hash_ref(&mut entries, list_key)?
            .cloned()
            .unwrap_or_default())
    }

    async fn hset(&self, list_key: &str, values: &[(&str, &str)]) -> Result<()> {
        if values.is_empty() {
            return Err(CacheError::InvalidArgument(
                "hset needs at least one field/value pair".to_string(),
            ));
        }
        let mut entries = self.entries.lock().await;
        let fields = Self::hash_mut(&mut entries, list_key)?;
        for (field, value) in values {
            fields.insert((*field).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn hdel(&self, list_key: &str, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries.lock().await;
        let emptied = match live(&mut entries, list_key, Instant::now()).map(|e| &mut e.value) {
            None => return Ok(()),
            Some(Stored::Str(_)) => return Err(CacheError::Store(WRONGTYPE.to_string())),
            Some(Stored::Hash(hash)) => {
                for field in fields {
                    hash.remove(*field);
                }
                hash.is_empty()
            }
        };
        // Redis drops a hash once its last field is gone
        if emptied {
            entries.remove(list_key);
        }
        Ok(())
    }

    async fn set_raw(&self, scope: &CancellationToken, key: &str, value: &str) -> Result<()> {
        check_scope(scope, "set_raw")?;
        let mut entries = self.entries.lock().await;
        Self::write_str(&mut entries, key, value.as_bytes().to_vec(), Ttl::Keep);
        Ok(())
    }

    async fn hset_raw(
        &self,
        scope: &CancellationToken,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        check_scope(scope, "hset_raw")?;
        let mut entries = self.entries.lock().await;
        Self::hash_mut(&mut entries, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn expire(&self, scope: &CancellationToken, key: &str, ttl: Duration) -> Result<bool> {
        check_scope(scope, "expire")?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let Some(entry) = live(&mut entries, key, now) else {
            return Ok(false);
        };
        if ttl.is_zero() {
            entries.remove(key);
        } else {
            entry.expires_at = deadline(now, ttl);
        }
        Ok(true)
    }

    async fn get_ttl(&self, scope: &CancellationToken, key: &str) -> Result<KeyTtl> {
        check_scope(scope, "get_ttl")?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(match live(&mut entries, key, now) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expiring(at.saturating_duration_since(now)),
        })
    }
}

//! # Connection Manager
//!
//! Opens the single multiplexed Redis connection the cache client runs on and
//! proves it live with a bounded `PING` before handing it out.

use redis::Client;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::client::RedisCache;
use crate::error::{CacheError, Result};

/// Upper bound on connect + `PING` at startup
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection descriptor, e.g. `redis://:password@host:6379/0`
    pub dsn: String,
    pub handshake_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Default::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dsn: "redis://127.0.0.1:6379".to_string(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

/// Owner of the live store connection.
///
/// Only obtainable through [`RedisConnector::connect`], so a handle always
/// refers to a connection that answered its handshake.
#[derive(Clone)]
pub struct RedisConnector {
    conn: ConnectionManager,
    config: ConnectionConfig,
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnector")
            .field("handshake_timeout", &self.config.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisConnector {
    /// Parse the descriptor, open the connection and `PING` it.
    ///
    /// # Errors
    ///
    /// `MalformedDescriptor` if the DSN does not parse, `HandshakeFailed` if
    /// the store cannot be reached or does not answer within
    /// `config.handshake_timeout`.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let client = Client::open(config.dsn.as_str())
            .map_err(|e| CacheError::MalformedDescriptor(e.to_string()))?;
        let addr = client.get_connection_info().addr.to_string();

        let handshake = async move {
            let mut conn = ConnectionManager::new(client).await?;
            let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>((conn, reply))
        };

        let (conn, reply) = match tokio::time::timeout(config.handshake_timeout, handshake).await {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                tracing::error!(%addr, error = %e, "Redis handshake failed");
                return Err(CacheError::HandshakeFailed(e.to_string()));
            }
            Err(_) => {
                tracing::error!(
                    %addr,
                    timeout_ms = crate::ttl::duration_millis(config.handshake_timeout),
                    "Redis handshake timed out"
                );
                return Err(CacheError::HandshakeFailed(format!(
                    "no reply from {addr} within {:?}",
                    config.handshake_timeout
                )));
            }
        };

        tracing::info!(%addr, %reply, "Redis connected");
        Ok(Self { conn, config })
    }

    /// Handle to the live connection; clones share the same multiplexed socket
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Cache client bound to this connection
    pub fn cache(&self) -> RedisCache {
        RedisCache::new(self.connection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CacheStore, OPERATION_TIMEOUT};
    use crate::ttl::Ttl;
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn read_line(buf: &[u8], at: usize) -> Option<(&[u8], usize)> {
        let end = buf[at..].windows(2).position(|w| w == b"\r\n")? + at;
        Some((&buf[at..end], end + 2))
    }

    /// One complete RESP command from the front of `buf`, with the bytes it spans
    fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
        let (head, mut at) = read_line(buf, 0)?;
        let argc: usize = std::str::from_utf8(head.strip_prefix(b"*")?).ok()?.parse().ok()?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            let (len, start) = read_line(buf, at)?;
            let len: usize = std::str::from_utf8(len.strip_prefix(b"$")?).ok()?.parse().ok()?;
            let end = start + len;
            if buf.len() < end + 2 {
                return None;
            }
            args.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
            at = end + 2;
        }
        Some((args, at))
    }

    /// Fake store that acknowledges setup commands and the handshake `PING`,
    /// then reads everything and never answers again
    async fn stalled_store() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let mut ponged = false;
            loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                while !ponged {
                    let Some((args, used)) = parse_command(&buf) else {
                        break;
                    };
                    buf.drain(..used);
                    let reply: &[u8] = if args.first().is_some_and(|cmd| cmd.eq_ignore_ascii_case("PING")) {
                        ponged = true;
                        b"+PONG\r\n"
                    } else {
                        b"+OK\r\n"
                    };
                    socket.write_all(reply).await.unwrap();
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_stalled_store_times_out_operations() {
        let addr = stalled_store().await;
        let connector = RedisConnector::connect(ConnectionConfig::new(format!("redis://{addr}")))
            .await
            .unwrap();
        let cache = connector.cache();

        // From here on the clock only moves when every task is idle
        tokio::time::pause();
        let started = tokio::time::Instant::now();

        let err = cache.set("k", &"v".into(), Ttl::Persist).await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { timeout_ms: 20_000 }), "{err}");
        assert!(err.is_timeout());
        assert!(started.elapsed() >= OPERATION_TIMEOUT);

        let err = cache.keys("*").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { timeout_ms: 20_000 }), "{err}");

        let err = cache.hget("list", "field").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { timeout_ms: 20_000 }), "{err}");
    }

    #[tokio::test]
    async fn test_malformed_descriptor() {
        let err = RedisConnector::connect(ConnectionConfig::new("not a redis url"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::MalformedDescriptor(_)), "{err}");
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_within_bound() {
        let config = ConnectionConfig {
            dsn: "redis://127.0.0.1:1".to_string(),
            handshake_timeout: Duration::from_secs(2),
        };

        let started = Instant::now();
        let err = RedisConnector::connect(config).await.unwrap_err();

        assert!(matches!(err, CacheError::HandshakeFailed(_)), "{err}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.handshake_timeout, HANDSHAKE_TIMEOUT);
        assert!(config.dsn.starts_with("redis://"));
    }
}

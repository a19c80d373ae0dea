//! # API Configuration
//!
//! Environment-based configuration for the cache API service.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ApiError;

/// Runtime mode; anything else aborts startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Debug,
    Release,
    Test,
}

impl ServerMode {
    /// Request metrics and `/metrics` are served in every mode but release
    pub const fn exposes_metrics(self) -> bool {
        !matches!(self, Self::Release)
    }
}

impl FromStr for ServerMode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "test" => Ok(Self::Test),
            other => Err(ApiError::Config(format!(
                "SERVER_MODE must be debug, release or test, got '{other}'"
            ))),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    pub mode: ServerMode,

    /// Time allowed for in-flight requests after a shutdown signal
    pub shutdown_timeout: Duration,

    /// Reported by `GET /`
    pub service_name: String,
    pub service_version: String,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Logging level
    pub log_level: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub dsn: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if a variable is set to an unparseable value.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let server_addr: SocketAddr = var("SERVER_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid SERVER_ADDR: {e}")))?;

        let mode: ServerMode = var("SERVER_MODE")
            .unwrap_or_else(|| "debug".to_string())
            .parse()?;

        let shutdown_timeout = match var("SHUTDOWN_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse::<u64>()
                    .map_err(|e| ApiError::Config(format!("invalid SHUTDOWN_TIMEOUT_SECS: {e}")))?,
            ),
            None => Duration::from_secs(10),
        };

        Ok(Self {
            server_addr,
            mode,
            shutdown_timeout,

            service_name: var("API_SERVICE_NAME").unwrap_or_else(|| "kvcache-api".to_string()),
            service_version: var("API_VERSION").unwrap_or_else(|| crate::VERSION.to_string()),

            redis: RedisConfig {
                dsn: var("REDIS_DSN")
                    .or_else(|| var("REDIS_URL"))
                    .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            },

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            cors_origins: var("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.mode, ServerMode::Debug);
        assert_eq!(config.redis.dsn, "redis://127.0.0.1:6379");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("SERVER_MODE", "release"),
            ("REDIS_URL", "redis://fallback:6379"),
            ("REDIS_DSN", "redis://:secret@cache:6379/2"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("API_SERVICE_NAME", "chat-cache"),
        ]))
        .unwrap();

        assert_eq!(config.mode, ServerMode::Release);
        assert_eq!(config.redis.dsn, "redis://:secret@cache:6379/2");
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.service_name, "chat-cache");
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let err = Config::from_lookup(lookup(&[("SERVER_MODE", "staging")])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn test_only_release_hides_metrics() {
        assert!(ServerMode::Debug.exposes_metrics());
        assert!(ServerMode::Test.exposes_metrics());
        assert!(!ServerMode::Release.exposes_metrics());
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Config::from_lookup(lookup(&[("SERVER_ADDR", "nowhere")])).is_err());
    }
}

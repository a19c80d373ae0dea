//! # kvcache API
//!
//! HTTP service exposing the cache client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                         │
//! │     (REST routes, CORS, request tracing, /metrics)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       AppState                              │
//! │          (injected SharedCache, service identity)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 kvcache-client (Redis)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod response;
pub mod routes;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use kvcache_client::SharedCache;

pub use config::{Config, ServerMode};
pub use error::{ApiError, ApiResult};
pub use metrics::HttpMetrics;

/// Identity reported by `GET /`
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

impl ServiceInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.service_name.clone(),
            version: config.service_version.clone(),
        }
    }
}

/// Application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
    pub info: Arc<ServiceInfo>,
    /// Present unless running in release mode
    pub metrics: Option<Arc<HttpMetrics>>,
}

impl AppState {
    /// # Errors
    ///
    /// Returns `ApiError::Internal` if the request metrics cannot be set up.
    pub fn new(cache: SharedCache, info: ServiceInfo, mode: ServerMode) -> ApiResult<Self> {
        let metrics = if mode.exposes_metrics() {
            Some(Arc::new(HttpMetrics::new()?))
        } else {
            None
        };
        Ok(Self {
            cache,
            info: Arc::new(info),
            metrics,
        })
    }
}

#[derive(Debug, Serialize)]
struct ServiceStatus<'a> {
    service: &'a str,
    version: &'a str,
    time: i64,
}

/// Service identity and current unix time
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceStatus {
        service: &state.info.name,
        version: &state.info.version,
        time: chrono::Utc::now().timestamp(),
    })
    .into_response()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let mut router = Router::new()
        // Scalar values
        .route("/v1/keys", get(routes::list_keys))
        .route(
            "/v1/cache/{key}",
            get(routes::get_value)
                .put(routes::set_value)
                .delete(routes::delete_value),
        )
        .route("/v1/cache/{key}/ttl", get(routes::get_ttl).put(routes::set_ttl))
        // Hashes
        .route("/v1/hash/{list}", get(routes::get_hash).put(routes::set_hash))
        .route(
            "/v1/hash/{list}/{field}",
            get(routes::get_hash_field).delete(routes::delete_hash_field),
        )
        // Health check
        .route("/health", get(health_check))
        .route("/", get(service_status));

    if let Some(http_metrics) = state.metrics.clone() {
        let exported = http_metrics.clone();
        router = router
            .route("/metrics", get(move || metrics::export(exported.clone())))
            .route_layer(middleware::from_fn_with_state(http_metrics, metrics::track));
    }

    // State and middleware
    router
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

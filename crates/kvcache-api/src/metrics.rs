//! # HTTP Metrics
//!
//! Per-route request counters and latency histograms, exported in the
//! Prometheus text format on `GET /metrics`. Only mounted outside release
//! mode (see [`ServerMode::exposes_metrics`](crate::ServerMode::exposes_metrics)).

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ApiError, ApiResult};

/// Request metrics backed by a registry owned by this instance
#[derive(Clone)]
pub struct HttpMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
}

impl HttpMetrics {
    /// Create and register the request collectors
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Internal` if a collector cannot be registered.
    pub fn new() -> ApiResult<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .map_err(metrics_error)?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            ),
            &["method", "path"],
        )
        .map_err(metrics_error)?;

        let registry = Registry::new();
        registry
            .register(Box::new(requests_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(request_duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
        })
    }

    /// Record one finished request
    pub fn observe(&self, method: &str, path: &str, status: StatusCode, elapsed: Duration) {
        let status = status.canonical_reason().unwrap_or(status.as_str());
        self.requests_total
            .with_label_values(&[method, path, status])
            .inc();
        self.request_duration
            .with_label_values(&[method, path])
            .observe(elapsed.as_secs_f64());
    }

    /// Current values in the Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Internal` if encoding fails.
    pub fn render(&self) -> ApiResult<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(metrics_error)
    }
}

fn metrics_error(e: prometheus::Error) -> ApiError {
    ApiError::Internal(format!("metrics: {e}"))
}

/// Middleware recording method, route template, status and latency
pub async fn track(State(metrics): State<Arc<HttpMetrics>>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    // Route template, so `/v1/cache/{key}` is one series rather than one per key
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_string(), |p| p.as_str().to_string());

    let response = next.run(req).await;
    metrics.observe(&method, &path, response.status(), started.elapsed());
    response
}

/// `GET /metrics`
pub async fn export(metrics: Arc<HttpMetrics>) -> ApiResult<impl IntoResponse> {
    let body = metrics.render()?;
    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_renders_series() {
        let metrics = HttpMetrics::new().unwrap();
        metrics.observe("GET", "/v1/cache/{key}", StatusCode::NOT_FOUND, Duration::from_millis(3));
        metrics.observe("GET", "/v1/cache/{key}", StatusCode::NOT_FOUND, Duration::from_millis(5));

        let text = metrics.render().unwrap();
        assert!(text.contains(
            r#"http_requests_total{method="GET",path="/v1/cache/{key}",status="Not Found"} 2"#
        ));
        assert!(text.contains(
            r#"http_request_duration_seconds_count{method="GET",path="/v1/cache/{key}"} 2"#
        ));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = HttpMetrics::new().unwrap();
        let b = HttpMetrics::new().unwrap();
        a.observe("GET", "/", StatusCode::OK, Duration::ZERO);

        assert!(a.render().unwrap().contains("http_requests_total"));
        assert!(!b.render().unwrap().contains(r#"path="/""#));
    }
}

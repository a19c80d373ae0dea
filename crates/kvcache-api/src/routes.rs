//! # Cache Routes
//!
//! REST handlers over the injected [`SharedCache`](kvcache_client::SharedCache).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use kvcache_client::{CacheValue, CancellationToken, KeyTtl, Ttl};
use tokio_util::sync::DropGuard;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::response;

/// Scope for caller-scoped cache calls made while serving a request
const REQUEST_SCOPE: Duration = Duration::from_secs(5);

/// Cancellation scope for one request.
///
/// Cancels itself after [`REQUEST_SCOPE`] or when dropped, whichever comes
/// first; either way the timer task ends with it.
struct RequestScope {
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl RequestScope {
    fn new() -> Self {
        let token = CancellationToken::new();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(REQUEST_SCOPE) => timer.cancel(),
            }
        });
        Self {
            _cancel_on_drop: token.clone().drop_guard(),
            token,
        }
    }

    const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Deserialize)]
pub struct KeysQuery {
    pub pattern: Option<String>,
    #[serde(default)]
    pub scan: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    pub value: serde_json::Value,
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub keep_ttl: bool,
}

impl SetValueRequest {
    fn ttl(&self) -> ApiResult<Ttl> {
        match (self.keep_ttl, self.ttl_secs) {
            (true, Some(_)) => Err(ApiError::InvalidInput(
                "ttl_secs and keep_ttl are mutually exclusive".to_string(),
            )),
            (true, None) => Ok(Ttl::Keep),
            (false, secs) => Ok(Ttl::from(secs.map(Duration::from_secs))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpireRequest {
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct HashSetRequest {
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// `GET /v1/keys?pattern=&scan=`
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> ApiResult<impl IntoResponse> {
    let pattern = query.pattern.as_deref().unwrap_or("*");
    let keys = if query.scan {
        state.cache.scan_keys(pattern).await?
    } else {
        state.cache.get_keys_pattern(pattern).await?
    };
    Ok(response::ok(keys))
}

/// `GET /v1/cache/{key}`
pub async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let value = state
        .cache
        .try_get(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("key", key.as_str()))?;
    Ok(response::ok(KeyValue { key, value }))
}

/// `PUT /v1/cache/{key}`
pub async fn set_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetValueRequest>,
) -> ApiResult<impl IntoResponse> {
    let ttl = req.ttl()?;
    let value = CacheValue::from(req.value);
    state.cache.set(&key, &value, ttl).await?;
    tracing::debug!(%key, ?ttl, "Value stored");
    Ok(response::created(KeyValue {
        key,
        value: value.encode(),
    }))
}

/// `DELETE /v1/cache/{key}`
pub async fn delete_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.cache.del(&[key]).await?;
    Ok(response::ok_empty())
}

/// `GET /v1/cache/{key}/ttl`
pub async fn get_ttl(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let scope = RequestScope::new();
    let ttl: KeyTtl = state.cache.get_ttl(scope.token(), &key).await?;
    Ok(response::ok(ttl))
}

/// `PUT /v1/cache/{key}/ttl`
pub async fn set_ttl(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ExpireRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.ttl_secs == 0 {
        return Err(ApiError::InvalidInput("ttl_secs must be positive".to_string()));
    }
    let scope = RequestScope::new();
    let applied = state
        .cache
        .expire(scope.token(), &key, Duration::from_secs(req.ttl_secs))
        .await?;
    if !applied {
        return Err(ApiError::not_found("key", key));
    }
    Ok(response::ok_empty())
}

/// `GET /v1/hash/{list}`
pub async fn get_hash(
    State(state): State<AppState>,
    Path(list): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let fields = state.cache.hgetall(&list).await?;
    Ok(response::ok(fields))
}

/// `PUT /v1/hash/{list}`
pub async fn set_hash(
    State(state): State<AppState>,
    Path(list): Path<String>,
    Json(req): Json<HashSetRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.fields.is_empty() {
        return Err(ApiError::InvalidInput("fields must not be empty".to_string()));
    }
    let pairs: Vec<(&str, &str)> = req
        .fields
        .iter()
        .map(|(f, v)| (f.as_str(), v.as_str()))
        .collect();
    state.cache.hset(&list, &pairs).await?;
    Ok(response::ok_empty())
}

/// `GET /v1/hash/{list}/{field}`
pub async fn get_hash_field(
    State(state): State<AppState>,
    Path((list, field)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let value = state
        .cache
        .hget(&list, &field)
        .await?
        .ok_or_else(|| ApiError::not_found("field", format!("{list}/{field}")))?;
    Ok(response::ok(KeyValue { key: field, value }))
}

/// `DELETE /v1/hash/{list}/{field}`
pub async fn delete_hash_field(
    State(state): State<AppState>,
    Path((list, field)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.cache.hdel(&list, &[field.as_str()]).await?;
    Ok(response::ok_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_scope_cancels_on_drop() {
        let scope = RequestScope::new();
        let token = scope.token().clone();
        assert!(!token.is_cancelled());

        drop(scope);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_scope_expires() {
        let scope = RequestScope::new();
        tokio::time::sleep(REQUEST_SCOPE + Duration::from_millis(1)).await;
        assert!(scope.token().is_cancelled());
    }

    #[test]
    fn test_keep_ttl_and_ttl_secs_conflict() {
        let req = SetValueRequest {
            value: serde_json::Value::Null,
            ttl_secs: Some(5),
            keep_ttl: true,
        };
        assert!(matches!(req.ttl(), Err(ApiError::InvalidInput(_))));

        let req = SetValueRequest {
            value: serde_json::Value::Null,
            ttl_secs: Some(0),
            keep_ttl: false,
        };
        assert_eq!(req.ttl().unwrap(), Ttl::Persist);
    }
}

//! # Response Envelopes
//!
//! Success bodies carry `{code, message, data}`; errors carry
//! `{code, message, error}`. `code` is always the HTTP status text.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const SUCCESS: &str = "SUCCESS";

fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

/// Successful response body
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(skip)]
    status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn with_status(status: StatusCode, data: Option<T>) -> Self {
        Self {
            status,
            code: status_text(status),
            message: SUCCESS,
            data,
        }
    }
}

/// `200` with a payload
pub fn ok<T: Serialize>(data: T) -> Envelope<T> {
    Envelope::with_status(StatusCode::OK, Some(data))
}

/// `200` without a payload
pub fn ok_empty() -> Envelope<()> {
    Envelope::with_status(StatusCode::OK, None)
}

/// `201` with a payload
pub fn created<T: Serialize>(data: T) -> Envelope<T> {
    Envelope::with_status(StatusCode::CREATED, Some(data))
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(skip)]
    status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub error: &'static str,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: status_text(status),
            message: message.into(),
            error: status_text(status),
        }
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_shape() {
        let body = serde_json::to_value(ok(vec!["a"])).unwrap();
        assert_eq!(body, json!({"code": "OK", "message": "SUCCESS", "data": ["a"]}));

        let body = serde_json::to_value(ok_empty()).unwrap();
        assert_eq!(body, json!({"code": "OK", "message": "SUCCESS"}));
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ErrorBody::new(StatusCode::NOT_FOUND, "no such key")).unwrap();
        assert_eq!(
            body,
            json!({"code": "Not Found", "message": "no such key", "error": "Not Found"})
        );
    }

    #[test]
    fn test_created_status() {
        let response = created("k").into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

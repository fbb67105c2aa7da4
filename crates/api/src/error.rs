//! Uniform error responses for the HTTP layer.
//!
//! Internal error objects never cross the request boundary; clients get a
//! machine-readable `error` code and a message string.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use db::ConnectionError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// The database is not ready (503).
    Unavailable(ConnectionError),

    /// Unexpected failure (500). `detail` is only filled in development.
    Internal { detail: Option<String> },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Unavailable(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "success": false,
                    "error": err.kind(),
                    "message": format!("Database service unavailable: {err}"),
                }),
            ),
            Self::Internal { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "success": false,
                    "error": "internal_error",
                    "message": detail.as_deref().unwrap_or("Internal server error"),
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ConnectionError> for ApiError {
    fn from(e: ConnectionError) -> Self {
        Self::Unavailable(e)
    }
}

/// Turn a handler panic into a 500, logging the payload.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_detail: bool) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(%message, "Request handler panicked");

    ApiError::Internal {
        detail: expose_detail.then_some(message),
    }
    .into_response()
}

//! Request gate: no request reaches a handler unless the database is ready.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use db::Connector;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that calls `ensure_connected` before the next stage.
///
/// On failure the request is answered with 503 and downstream handlers are
/// never invoked.
pub async fn require_connection<K: Connector>(
    State(state): State<AppState<K>>,
    request: Request,
    next: Next,
) -> Response {
    match state.db.ensure_connected().await {
        Ok(()) => next.run(request).await,
        Err(err) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                error_kind = %err.kind(),
                "Rejecting request, database unavailable: {err}"
            );
            ApiError::Unavailable(err).into_response()
        }
    }
}

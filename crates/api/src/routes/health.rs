//! Health check route
//!
//! Never gated: it reports the connection state instead of requiring it.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use db::{ConnectionStatus, Connector};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: ConnectionStatus,
}

pub fn router<K: Connector>() -> Router<AppState<K>> {
    Router::new().route("/health", get(health_check::<K>))
}

/// GET /health - `ok` when the connection is live, `degraded` otherwise.
pub async fn health_check<K: Connector>(State(state): State<AppState<K>>) -> Json<HealthResponse> {
    let database = state.db.status();
    Json(HealthResponse {
        status: if database.live { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

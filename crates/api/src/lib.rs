//! `api` crate — HTTP layer of the backend.
//!
//! Exposes:
//!   GET /        — landing banner (gated)
//!   GET /health  — connection status (never gated)
//!   business routes supplied by the caller (gated)
//!
//! Every gated request calls `ensure_connected` first and is answered with
//! 503 when the database is not ready.

pub mod bootstrap;
pub mod error;
pub mod gate;
pub mod routes;
pub mod server;
pub mod state;

pub use bootstrap::ExecutionMode;
pub use error::ApiError;
pub use server::{app, serve, ServeConfig, ServerError};
pub use state::AppState;

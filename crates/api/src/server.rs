//! Axum server setup
//!
//! - Request gate on every routed endpoint except `/health`
//! - Handler panics become 500 responses
//! - CORS restricted to the configured origins
//! - Graceful shutdown on SIGTERM/Ctrl+C, releasing the database connection

use std::any::Any;
use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{middleware, Router};
use db::Connector;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bootstrap::ExecutionMode;
use crate::error::panic_response;
use crate::gate::require_connection;
use crate::routes;
use crate::state::AppState;

pub const DEFAULT_PORT: u16 = 5000;

/// Origins allowed when `CORS_ORIGINS` is not set.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5000"];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub bind_addr: SocketAddr,
    pub mode: ExecutionMode,
    /// Gate requests on the database in persistent mode. Always on in
    /// serverless mode.
    pub request_gate: bool,
    pub cors_origins: Vec<String>,
    /// Include panic messages in 500 bodies.
    pub expose_errors: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            mode: ExecutionMode::Persistent,
            request_gate: true,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            expose_errors: false,
        }
    }
}

impl ServeConfig {
    pub fn gate_enforced(&self) -> bool {
        self.mode.requires_gate() || self.request_gate
    }
}

/// Build the application router.
///
/// `extra` carries the business routes; they are merged in behind the gate.
/// The returned router is what a serverless adapter would invoke directly.
pub fn app<K: Connector>(state: AppState<K>, extra: Router<AppState<K>>, config: &ServeConfig) -> Router {
    let mut gated = Router::new().route("/", get(routes::root::root)).merge(extra);
    if config.gate_enforced() {
        gated = gated.route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_connection::<K>,
        ));
    } else {
        warn!("Request gate disabled; handlers must check the connection themselves");
    }

    let expose = config.expose_errors;
    Router::new()
        .merge(routes::health::router::<K>())
        .merge(gated)
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            panic_response(panic, expose)
        }))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Run the HTTP server until a shutdown signal arrives, then release the
/// database connection.
pub async fn serve<K: Connector>(
    state: AppState<K>,
    extra: Router<AppState<K>>,
    config: ServeConfig,
) -> Result<(), ServerError> {
    let app = app(state.clone(), extra, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(mode = %config.mode, gate = config.gate_enforced(), "Server started on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

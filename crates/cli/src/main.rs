//! `crud-backend` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve` — start the API server.
//! - `check` — make one connection attempt and print the connection status.
//!
//! Settings come from flags, the environment, or a `.env` file, in that
//! order of precedence.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use api::{AppState, ExecutionMode, ServeConfig};
use axum::Router;
use clap::{Args, Parser, Subcommand};
use db::{ConnectionManager, DbConfig, PgConnector};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "crud-backend",
    about = "CRUD API backend with managed database connection",
    version
)]
struct Cli {
    /// Debug logging (ignored when RUST_LOG is set).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve(ServeArgs),
    /// Attempt one database connection and report the result.
    Check(DbArgs),
}

#[derive(Args)]
struct DbArgs {
    /// Database connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Server-selection / connect timeout in milliseconds.
    #[arg(long, env = "DB_CONNECT_TIMEOUT_MS", default_value_t = 5_000)]
    connect_timeout_ms: u64,

    /// Socket (idle) timeout in milliseconds.
    #[arg(long, env = "DB_SOCKET_TIMEOUT_MS", default_value_t = 45_000)]
    socket_timeout_ms: u64,

    #[arg(long, env = "DB_MIN_CONNECTIONS", default_value_t = db::config::DEFAULT_MIN_CONNECTIONS)]
    min_connections: u32,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = db::config::DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,
}

impl DbArgs {
    fn to_config(&self) -> DbConfig {
        DbConfig::new(self.database_url.clone())
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_socket_timeout(Duration::from_millis(self.socket_timeout_ms))
            .with_pool_bounds(self.min_connections, self.max_connections)
    }
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    db: DbArgs,

    /// Port to listen on (all interfaces).
    #[arg(long, env = "PORT", default_value_t = api::server::DEFAULT_PORT)]
    port: u16,

    /// `persistent` or `serverless`. Detected from the platform when unset.
    #[arg(long, env = "EXECUTION_MODE")]
    mode: Option<ExecutionMode>,

    /// Skip the per-request database gate (persistent mode only).
    #[arg(long)]
    no_request_gate: bool,

    /// Allowed CORS origins, comma-separated.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Deployment environment; `development` puts panic messages in 500 bodies.
    #[arg(long, env = "APP_ENV", default_value = "production")]
    app_env: String,
}

impl ServeArgs {
    fn to_serve_config(&self) -> ServeConfig {
        let defaults = ServeConfig::default();
        let cors_origins: Vec<String> = self
            .cors_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        ServeConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            mode: self.mode.unwrap_or_else(ExecutionMode::detect),
            request_gate: !self.no_request_gate,
            cors_origins: if cors_origins.is_empty() {
                defaults.cors_origins
            } else {
                cors_origins
            },
            expose_errors: self.app_env == "development",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.debug)?;
    api::bootstrap::install_panic_hook();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Check(args) => check(args).await,
    }
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let db_config = args.db.to_config();
    info!(database_url_set = db_config.has_url(), ?db_config, "Loaded database configuration");

    let serve_config = args.to_serve_config();

    let db = ConnectionManager::new(db_config, PgConnector);
    // Startup continues while the eager attempt is pending; the gate
    // covers requests that arrive first.
    let _eager = api::bootstrap::start(&db, serve_config.mode);

    // Business routes (auth, profile, payment, course) are mounted by the
    // deployment; the stock binary serves the banner and health check.
    let routes = Router::new();
    api::serve(AppState::new(db), routes, serve_config)
        .await
        .context("server error")
}

async fn check(args: DbArgs) -> anyhow::Result<()> {
    let db = ConnectionManager::new(args.to_config(), PgConnector);
    let result = db.ensure_connected().await;

    println!("{}", serde_json::to_string_pretty(&db.status())?);
    db.close().await;

    result.context("database check failed")
}

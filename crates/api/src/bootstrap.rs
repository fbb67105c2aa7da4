//! Process startup: execution mode, eager connect, and the top-level panic
//! handler.
//!
//! In persistent mode the process fires one connection attempt at startup
//! and keeps going; the request gate covers requests that arrive before it
//! lands. In serverless mode the process may be frozen and thawed between
//! invocations, so nothing is assumed about the connection at startup and
//! every request goes through the gate.

use std::fmt;
use std::str::FromStr;

use db::{ConnectionManager, Connector};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Long-lived server process.
    #[default]
    Persistent,
    /// Cold-started per invocation; the process may be frozen and reused.
    Serverless,
}

impl ExecutionMode {
    /// `EXECUTION_MODE` if set and valid, otherwise serverless when running
    /// on a platform that sets `VERCEL`, otherwise persistent.
    pub fn detect() -> Self {
        if let Ok(raw) = std::env::var("EXECUTION_MODE") {
            match raw.parse() {
                Ok(mode) => return mode,
                Err(e) => warn!("{e}; falling back to platform detection"),
            }
        }
        if std::env::var_os("VERCEL").is_some() {
            Self::Serverless
        } else {
            Self::Persistent
        }
    }

    /// The per-request gate cannot be switched off in serverless mode.
    pub fn requires_gate(&self) -> bool {
        matches!(self, Self::Serverless)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Serverless => write!(f, "serverless"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" | "server" => Ok(Self::Persistent),
            "serverless" | "lambda" => Ok(Self::Serverless),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Kick off startup work for `mode`.
///
/// Persistent mode spawns one eager `ensure_connected` and returns
/// immediately; the handle resolves once the outcome has been logged.
/// Serverless mode does nothing and returns `None`.
pub fn start<K: Connector>(db: &ConnectionManager<K>, mode: ExecutionMode) -> Option<JoinHandle<()>> {
    match mode {
        ExecutionMode::Persistent => {
            let db = db.clone();
            Some(tokio::spawn(async move {
                match db.ensure_connected().await {
                    Ok(()) => info!("All services initialized"),
                    Err(e) => error!(error_kind = %e.kind(), "Service initialization error: {e}"),
                }
            }))
        }
        ExecutionMode::Serverless => {
            debug!("Serverless mode: deferring database connection to first request");
            None
        }
    }
}

/// Log panics from any thread or task instead of letting them go to stderr
/// unstructured. Tokio contains panics in spawned tasks, so with this hook a
/// failing driver task shows up in the logs and the process keeps serving.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(%message, %location, "Unhandled panic");
    }));
}

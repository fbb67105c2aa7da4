//! Connection configuration, read once at process start.
//!
//! The binary fills this from flags and environment variables
//! (`DATABASE_URL`, `DB_CONNECT_TIMEOUT_MS`, `DB_SOCKET_TIMEOUT_MS`,
//! `DB_MIN_CONNECTIONS`, `DB_MAX_CONNECTIONS`).

use std::time::Duration;

use crate::ConnectionError;

/// Default server-selection / connect budget.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Default socket (idle) timeout for pooled connections.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(45_000);
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Immutable connection settings.
///
/// The manager keeps its own copy; nothing mutates it after construction.
#[derive(Clone)]
pub struct DbConfig {
    /// Connection string. `None` makes every attempt fail with
    /// [`ConnectionError::ConfigMissing`].
    pub database_url: Option<String>,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    /// Settings with the default timeouts and pool bounds.
    pub fn new(database_url: Option<String>) -> Self {
        Self {
            database_url: database_url.filter(|url| !url.trim().is_empty()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set pool bounds. `max` is raised to `min` if smaller.
    pub fn with_pool_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_connections = min;
        self.max_connections = max.max(min).max(1);
        self
    }

    /// The connection string, or `ConfigMissing` when absent.
    pub fn require_url(&self) -> Result<&str, ConnectionError> {
        self.database_url
            .as_deref()
            .ok_or(ConnectionError::ConfigMissing("DATABASE_URL"))
    }

    pub fn has_url(&self) -> bool {
        self.database_url.is_some()
    }
}

// The connection string carries credentials; keep it out of logs.
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

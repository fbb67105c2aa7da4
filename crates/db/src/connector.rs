//! The seams between the lifecycle manager and a concrete driver.
//!
//! [`Connector`] opens a connection; [`ManagedConnection`] answers the cheap
//! liveness question and releases the connection. The Postgres pool is the
//! production implementation; [`crate::mock`] provides the test double.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::DbConfig;

/// A connection object owned by the manager.
///
/// Clones must refer to the same underlying connection (pool handles,
/// `Arc`s), so handing a clone to a route handler never opens a second one.
#[async_trait]
pub trait ManagedConnection: Clone + Send + Sync + 'static {
    /// Local, non-blocking readiness check. Must not perform I/O.
    fn is_live(&self) -> bool;

    /// Release the connection. Safe to call more than once.
    async fn release(&self);
}

/// Opens connections for the manager.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: ManagedConnection;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform one connection attempt against `url`.
    ///
    /// The manager bounds this call with `config.connect_timeout`; the
    /// connector does not need its own retry loop.
    async fn connect(&self, url: &str, config: &DbConfig) -> Result<Self::Connection, Self::Error>;
}

#[async_trait]
impl ManagedConnection for PgPool {
    fn is_live(&self) -> bool {
        !self.is_closed()
    }

    async fn release(&self) {
        self.close().await;
    }
}

/// Connects a Postgres pool using the configured bounds and timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgPool;
    type Error = sqlx::Error;

    async fn connect(&self, url: &str, config: &DbConfig) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.socket_timeout))
            .test_before_acquire(true)
            .connect(url)
            .await
    }
}

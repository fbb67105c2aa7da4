//! `db` crate — connection lifecycle for the backend's database.
//!
//! Owns the one process-wide connection behind a [`ConnectionManager`],
//! which establishes it on demand, shares a single in-flight attempt among
//! concurrent callers, and replaces it when the driver reports it dead.
//! Query and schema code live with the route handlers, not here.

pub mod attempt;
pub mod config;
pub mod connector;
pub mod error;
pub mod handle;
pub mod manager;
pub mod mock;

pub use config::DbConfig;
pub use connector::{Connector, ManagedConnection, PgConnector};
pub use error::{ConnectionError, ConnectionErrorKind};
pub use handle::{ConnectionState, ResourceHandle};
pub use manager::{ConnectionManager, ConnectionStatus};

#[cfg(test)]
mod manager_tests;

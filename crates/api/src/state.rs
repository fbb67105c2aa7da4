//! Application state shared across handlers

use db::{ConnectionManager, Connector};

/// Shared application state.
///
/// Route handlers reach the database only through `db`, calling
/// [`ConnectionManager::connection`] per request rather than caching the
/// connection.
pub struct AppState<K: Connector> {
    pub db: ConnectionManager<K>,
}

impl<K: Connector> AppState<K> {
    pub fn new(db: ConnectionManager<K>) -> Self {
        Self { db }
    }
}

impl<K: Connector> Clone for AppState<K> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

//! Connection lifecycle manager.
//!
//! `ConnectionManager` is the single owner of the process-wide
//! [`ResourceHandle`]. It guarantees:
//! 1. A caller that finds the handle `Live` (and passing its liveness probe)
//!    returns immediately without any I/O.
//! 2. At most one [`ConnectionAttempt`] is in flight. Callers arriving while
//!    one runs subscribe to it and receive its exact result.
//! 3. Every attempt is bounded by `connect_timeout`, so waiters are always
//!    released.
//! 4. There is no retry loop here; each call is one attempt or one wait.
//! 5. An attempt whose task was dropped before resolving is reaped on the
//!    next call, so `Connecting` never becomes terminal.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::attempt::{AttemptResolver, AttemptWaiter, ConnectionAttempt};
use crate::connector::{Connector, ManagedConnection};
use crate::error::ConnectionErrorKind;
use crate::handle::{ConnectionState, Resolution, ResourceHandle};
use crate::{ConnectionError, DbConfig};

/// Point-in-time view of the manager, for health endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub live: bool,
    pub last_error: Option<String>,
    pub error_kind: Option<ConnectionErrorKind>,
    pub connected_since: Option<DateTime<Utc>>,
    /// Connection attempts started since process start.
    pub attempts: u64,
}

/// Owns the connection and serialises every transition of its handle.
///
/// Cheap to clone; all clones share one handle.
pub struct ConnectionManager<K: Connector> {
    inner: Arc<Inner<K>>,
}

struct Inner<K: Connector> {
    config: DbConfig,
    connector: K,
    handle: Mutex<ResourceHandle<K::Connection>>,
    attempts: AtomicU64,
}

impl<K: Connector> Clone for ConnectionManager<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Connector> ConnectionManager<K> {
    pub fn new(config: DbConfig, connector: K) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                handle: Mutex::new(ResourceHandle::new()),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Make sure the resource is ready.
    ///
    /// Returns at once when live, joins the in-flight attempt when one is
    /// running, and otherwise starts exactly one new attempt. A live
    /// connection that fails its probe is released and replaced in the same
    /// call.
    pub async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        let waiter = {
            let mut handle = self.inner.handle.lock();
            if handle.probe_liveness() {
                debug!("Reusing live database connection");
                return Ok(());
            }
            if let Some(id) = handle.reap_abandoned() {
                warn!(attempt = id, "Connection attempt abandoned before completing; starting a new one");
            }
            match handle.in_flight() {
                Some(attempt) => {
                    debug!(
                        attempt = attempt.id(),
                        elapsed_ms = attempt.elapsed().as_millis() as u64,
                        timeout_ms = attempt.timeout().as_millis() as u64,
                        "Joining in-flight connection attempt"
                    );
                    attempt.subscribe()
                }
                None => self.start_attempt(&mut handle)?,
            }
        };
        waiter.wait().await
    }

    /// Caller must hold the handle lock; the handle is neither live nor
    /// connecting.
    fn start_attempt(
        &self,
        handle: &mut ResourceHandle<K::Connection>,
    ) -> Result<AttemptWaiter, ConnectionError> {
        if let Some(dead) = handle.decay() {
            warn!(
                error_kind = %ConnectionErrorKind::Decayed,
                "Live database connection failed its liveness probe; reconnecting"
            );
            tokio::spawn(async move { dead.release().await });
        }

        let url = match self.inner.config.require_url() {
            Ok(url) => url.to_owned(),
            Err(err) => {
                warn!(error_kind = %err.kind(), "Database connection not attempted: {err}");
                handle.fail(err.clone());
                return Err(err);
            }
        };

        let id = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = self.inner.config.connect_timeout;
        let (attempt, resolver) = ConnectionAttempt::begin(id, timeout);
        let waiter = attempt.subscribe();
        handle.begin(attempt);

        info!(
            attempt = id,
            timeout_ms = timeout.as_millis() as u64,
            "Attempting to connect to database"
        );
        tokio::spawn(Arc::clone(&self.inner).run_attempt(id, url, resolver));
        Ok(waiter)
    }

    /// `ensure_connected`, then a clone of the live connection.
    ///
    /// Do not hold the returned handle across suspension points without
    /// calling this again.
    pub async fn connection(&self) -> Result<K::Connection, ConnectionError> {
        self.ensure_connected().await?;
        self.inner
            .handle
            .lock()
            .live_connection()
            .cloned()
            .ok_or(ConnectionError::Decayed)
    }

    /// Local liveness check; never blocks on I/O.
    pub fn probe_liveness(&self) -> bool {
        self.inner.handle.lock().probe_liveness()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.handle.lock().state()
    }

    pub fn last_error(&self) -> Option<ConnectionError> {
        self.inner.handle.lock().last_error().cloned()
    }

    pub fn attempts_started(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        let handle = self.inner.handle.lock();
        ConnectionStatus {
            state: handle.state(),
            live: handle.probe_liveness(),
            last_error: handle.last_error().map(ToString::to_string),
            error_kind: handle.last_error().map(ConnectionError::kind),
            connected_since: handle.connected_since(),
            attempts: self.attempts_started(),
        }
    }

    /// Release the connection and return to `Unconnected`. Idempotent.
    pub async fn close(&self) {
        let detached = self.inner.handle.lock().close();
        if let Some(conn) = detached {
            conn.release().await;
            info!("Database connection closed");
        }
    }
}

impl<K: Connector> Inner<K> {
    #[instrument(name = "connect_attempt", skip(self, url, resolver), fields(attempt = id))]
    async fn run_attempt(self: Arc<Self>, id: u64, url: String, resolver: AttemptResolver) {
        let budget = self.config.connect_timeout;
        let started = Instant::now();
        let connect = tokio::time::timeout(budget, self.connector.connect(&url, &self.config));

        let result = match AssertUnwindSafe(connect).catch_unwind().await {
            Ok(Ok(Ok(conn))) => Ok(conn),
            Ok(Ok(Err(err))) => Err(ConnectionError::refused(err)),
            Ok(Err(_elapsed)) => Err(ConnectionError::Timeout(budget)),
            Err(_panic) => Err(ConnectionError::refused_msg(
                "connector panicked during connection attempt",
            )),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => {
                info!(elapsed_ms, "Database connected successfully");
                Ok(())
            }
            Err(err) => {
                warn!(elapsed_ms, error_kind = %err.kind(), "Database connection error: {err}");
                Err(err.clone())
            }
        };

        let resolution = self.handle.lock().resolve(id, result);
        match resolution {
            Resolution::Applied => resolver.resolve(outcome),
            Resolution::Orphaned(conn) => {
                // Waiters must not proceed: the handle no longer holds a connection.
                resolver.resolve(Err(ConnectionError::refused_msg(
                    "connection closed during attempt",
                )));
                if let Some(conn) = conn {
                    debug!("Manager closed during attempt; releasing new connection");
                    conn.release().await;
                }
            }
        }
    }
}

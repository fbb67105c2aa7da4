//! `ResourceHandle` — sole owner of the underlying connection.
//!
//! The connection lives inside the `Live` slot, so "connection present iff
//! state is `Live`" holds by construction. The handle answers liveness
//! questions but never decides to reconnect; every transition is driven by
//! [`crate::ConnectionManager`] while it holds the handle's lock.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::attempt::ConnectionAttempt;
use crate::connector::ManagedConnection;
use crate::ConnectionError;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Live,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug)]
enum Slot<C> {
    Unconnected,
    Connecting(ConnectionAttempt),
    Live { conn: C, since: DateTime<Utc> },
    Failed,
}

/// Result of applying a finished attempt to the handle.
#[derive(Debug)]
pub(crate) enum Resolution<C> {
    Applied,
    /// The handle moved on (it was closed) while the attempt ran. Any
    /// connection the attempt produced is returned for release.
    Orphaned(Option<C>),
}

#[derive(Debug)]
pub struct ResourceHandle<C> {
    slot: Slot<C>,
    last_error: Option<ConnectionError>,
}

impl<C: ManagedConnection> Default for ResourceHandle<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ManagedConnection> ResourceHandle<C> {
    pub fn new() -> Self {
        Self {
            slot: Slot::Unconnected,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.slot {
            Slot::Unconnected => ConnectionState::Unconnected,
            Slot::Connecting(_) => ConnectionState::Connecting,
            Slot::Live { .. } => ConnectionState::Live,
            Slot::Failed => ConnectionState::Failed,
        }
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        match &self.slot {
            Slot::Live { since, .. } => Some(*since),
            _ => None,
        }
    }

    /// Cheap local check: `Live` and the driver still reports the connection
    /// as usable. A panicking probe counts as "not live".
    pub fn probe_liveness(&self) -> bool {
        match &self.slot {
            Slot::Live { conn, .. } => catch_unwind(AssertUnwindSafe(|| conn.is_live())).unwrap_or(false),
            _ => false,
        }
    }

    /// The connection, only when it passes the liveness probe.
    pub fn live_connection(&self) -> Option<&C> {
        match &self.slot {
            Slot::Live { conn, .. } if self.probe_liveness() => Some(conn),
            _ => None,
        }
    }

    pub fn in_flight(&self) -> Option<&ConnectionAttempt> {
        match &self.slot {
            Slot::Connecting(attempt) => Some(attempt),
            _ => None,
        }
    }

    /// Detach the connection and return to `Unconnected`.
    ///
    /// Idempotent. An attempt still in flight is orphaned: when it finishes,
    /// [`ResourceHandle::resolve`] hands its connection back for release.
    pub fn close(&mut self) -> Option<C> {
        match std::mem::replace(&mut self.slot, Slot::Unconnected) {
            Slot::Live { conn, .. } => Some(conn),
            _ => None,
        }
    }

    /// `Live` → `Failed` with `Decayed`, when the probe no longer passes.
    /// Returns the dead connection for release.
    pub(crate) fn decay(&mut self) -> Option<C> {
        if !matches!(self.slot, Slot::Live { .. }) || self.probe_liveness() {
            return None;
        }
        let conn = self.close();
        self.slot = Slot::Failed;
        self.last_error = Some(ConnectionError::Decayed);
        conn
    }

    /// `Connecting` → `Failed` when the in-flight attempt can no longer
    /// resolve. Returns the abandoned attempt's id.
    pub(crate) fn reap_abandoned(&mut self) -> Option<u64> {
        let id = match &self.slot {
            Slot::Connecting(attempt) if attempt.is_abandoned() => attempt.id(),
            _ => return None,
        };
        self.fail(ConnectionError::refused_msg(
            "connection attempt was abandoned before completing",
        ));
        Some(id)
    }

    pub(crate) fn fail(&mut self, err: ConnectionError) {
        self.slot = Slot::Failed;
        self.last_error = Some(err);
    }

    pub(crate) fn begin(&mut self, attempt: ConnectionAttempt) {
        debug_assert!(
            !matches!(self.slot, Slot::Connecting(_) | Slot::Live { .. }),
            "attempt started while another is in flight or a connection is live"
        );
        self.slot = Slot::Connecting(attempt);
    }

    /// Apply the result of attempt `id`.
    pub(crate) fn resolve(&mut self, id: u64, result: Result<C, ConnectionError>) -> Resolution<C> {
        let current = matches!(&self.slot, Slot::Connecting(attempt) if attempt.id() == id);
        if !current {
            return Resolution::Orphaned(result.ok());
        }

        match result {
            Ok(conn) => {
                self.slot = Slot::Live {
                    conn,
                    since: Utc::now(),
                };
                self.last_error = None;
            }
            Err(err) => self.fail(err),
        }
        Resolution::Applied
    }
}

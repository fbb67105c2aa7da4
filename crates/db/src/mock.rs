//! `MockConnector` — a test double for [`Connector`].
//!
//! Useful in unit and integration tests where a real database is either
//! unavailable or irrelevant. It counts every attempt it receives, so tests
//! can assert how many connections the manager actually tried to open.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connector::{Connector, ManagedConnection};
use crate::DbConfig;

/// Behaviour injected into `MockConnector`; can be swapped between attempts.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed after the given delay.
    Succeed(Duration),
    /// Fail with `MockError` after the given delay.
    Refuse(Duration, String),
    /// Never resolve.
    Hang,
    /// Panic inside the attempt.
    Panic,
}

/// Error returned by a refusing `MockConnector`.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// Connection handed out by `MockConnector`.
#[derive(Debug, Clone)]
pub struct MockConnection {
    /// Sequence number of the attempt that produced this connection (1-based).
    pub serial: usize,
    live: Arc<AtomicBool>,
    poisoned: Arc<AtomicBool>,
    released: Arc<AtomicUsize>,
}

impl MockConnection {
    /// Simulate the driver dropping the connection.
    pub fn kill(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Make every later liveness check panic, as a misbehaving driver might.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Number of times `release` has been called on this connection.
    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedConnection for MockConnection {
    fn is_live(&self) -> bool {
        if self.poisoned.load(Ordering::SeqCst) {
            panic!("mock connection {} panicked in liveness check", self.serial);
        }
        self.live.load(Ordering::SeqCst)
    }

    async fn release(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A mock connector that records every attempt and behaves as configured.
#[derive(Clone)]
pub struct MockConnector {
    behaviour: Arc<Mutex<MockBehaviour>>,
    attempts: Arc<AtomicUsize>,
    issued: Arc<Mutex<Vec<MockConnection>>>,
}

impl MockConnector {
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            attempts: Arc::new(AtomicUsize::new(0)),
            issued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that connects immediately.
    pub fn succeeding() -> Self {
        Self::new(MockBehaviour::Succeed(Duration::ZERO))
    }

    /// Create a mock that connects after `delay`.
    pub fn succeeding_after(delay: Duration) -> Self {
        Self::new(MockBehaviour::Succeed(delay))
    }

    /// Create a mock that refuses after `delay`.
    pub fn refusing_after(delay: Duration, msg: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Refuse(delay, msg.into()))
    }

    /// Create a mock whose attempts never resolve.
    pub fn hanging() -> Self {
        Self::new(MockBehaviour::Hang)
    }

    /// Change behaviour for subsequent attempts.
    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    /// Number of attempts started so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connections handed out so far, in order.
    pub fn issued(&self) -> Vec<MockConnection> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self, _url: &str, _config: &DbConfig) -> Result<MockConnection, MockError> {
        let serial = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let behaviour = self.behaviour.lock().clone();

        match behaviour {
            MockBehaviour::Succeed(delay) => {
                tokio::time::sleep(delay).await;
                let conn = MockConnection {
                    serial,
                    live: Arc::new(AtomicBool::new(true)),
                    poisoned: Arc::new(AtomicBool::new(false)),
                    released: Arc::new(AtomicUsize::new(0)),
                };
                self.issued.lock().push(conn.clone());
                Ok(conn)
            }
            MockBehaviour::Refuse(delay, msg) => {
                tokio::time::sleep(delay).await;
                Err(MockError(msg))
            }
            MockBehaviour::Hang => std::future::pending().await,
            MockBehaviour::Panic => panic!("mock connector panicked on attempt {serial}"),
        }
    }
}

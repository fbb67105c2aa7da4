//! A single in-flight connection attempt and its broadcast result.
//!
//! The spawned attempt task owns the [`AttemptResolver`]; every caller that
//! finds the handle in `Connecting` takes an [`AttemptWaiter`] from the same
//! [`ConnectionAttempt`], so all of them observe one identical outcome.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::ConnectionError;

type Outcome = Option<Result<(), ConnectionError>>;

/// Metadata and result slot for the one attempt currently in flight.
#[derive(Debug)]
pub struct ConnectionAttempt {
    id: u64,
    timeout: Duration,
    started: Instant,
    outcome: watch::Receiver<Outcome>,
}

impl ConnectionAttempt {
    /// Open a pending attempt. The resolver half goes to the task that
    /// performs the connect call.
    pub(crate) fn begin(id: u64, timeout: Duration) -> (Self, AttemptResolver) {
        let (tx, rx) = watch::channel(None);
        let attempt = Self {
            id,
            timeout,
            started: Instant::now(),
            outcome: rx,
        };
        (attempt, AttemptResolver { tx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the attempt has produced a result yet.
    pub fn is_pending(&self) -> bool {
        self.outcome.borrow().is_none()
    }

    /// Still pending, but the resolver is gone: the task running the
    /// attempt was dropped (usually with its runtime) and will never
    /// publish a result.
    pub fn is_abandoned(&self) -> bool {
        self.is_pending() && self.outcome.has_changed().is_err()
    }

    pub fn subscribe(&self) -> AttemptWaiter {
        AttemptWaiter {
            outcome: self.outcome.clone(),
        }
    }
}

/// Publishes the attempt's result to every waiter. Consumed on use.
#[derive(Debug)]
pub struct AttemptResolver {
    tx: watch::Sender<Outcome>,
}

impl AttemptResolver {
    pub fn resolve(self, result: Result<(), ConnectionError>) {
        self.tx.send_replace(Some(result));
    }
}

/// One caller's view of an attempt.
#[derive(Debug)]
pub struct AttemptWaiter {
    outcome: watch::Receiver<Outcome>,
}

impl AttemptWaiter {
    /// Suspend until the attempt resolves.
    ///
    /// If the resolver is dropped without publishing (the attempt task was
    /// torn down with the runtime), waiters get a `Refused` error instead of
    /// hanging.
    pub async fn wait(mut self) -> Result<(), ConnectionError> {
        let outcome = match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(ConnectionError::refused_msg(
                "connection attempt was abandoned before completing",
            ))
        })
    }
}

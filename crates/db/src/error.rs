//! Typed error type for the db crate.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Shared, clonable cause of a failed connection attempt.
///
/// Every waiter on one attempt receives a clone of the same error, so the
/// underlying driver error is reference-counted rather than boxed.
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors returned by [`crate::ConnectionManager::ensure_connected`].
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Required configuration (the connection string) is absent.
    /// Raised before any network call is made.
    #[error("missing required configuration: {0}")]
    ConfigMissing(&'static str),

    /// The attempt did not finish within the configured budget.
    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The driver reported an error while connecting.
    #[error("connection refused: {message}")]
    Refused {
        message: String,
        #[source]
        source: Option<SharedCause>,
    },

    /// A previously live connection failed its liveness probe.
    #[error("live connection failed its liveness probe")]
    Decayed,
}

/// Machine-readable classification of a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    ConfigMissing,
    Timeout,
    Refused,
    Decayed,
}

impl ConnectionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::Decayed => "decayed",
        }
    }
}

impl std::fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectionError {
    pub fn kind(&self) -> ConnectionErrorKind {
        match self {
            Self::ConfigMissing(_) => ConnectionErrorKind::ConfigMissing,
            Self::Timeout(_) => ConnectionErrorKind::Timeout,
            Self::Refused { .. } => ConnectionErrorKind::Refused,
            Self::Decayed => ConnectionErrorKind::Decayed,
        }
    }

    /// Wrap a driver error as [`ConnectionError::Refused`].
    pub fn refused<E>(cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Refused {
            message: cause.to_string(),
            source: Some(Arc::new(cause)),
        }
    }

    /// A `Refused` error with no underlying driver cause.
    pub fn refused_msg(message: impl Into<String>) -> Self {
        Self::Refused {
            message: message.into(),
            source: None,
        }
    }
}

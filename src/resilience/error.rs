//! Errors surfaced by circuit breakers.

use std::time::Duration;
use thiserror::Error;

use crate::resilience::classify::{Classify, FailureKind};

/// Outcome of a failed call routed through a circuit breaker.
///
/// The breaker never swallows the operation's own error: it comes back as
/// [`BreakerError::Inner`] whether or not it counted against the breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was never invoked.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The operation did not finish before the breaker's deadline.
    #[error("call through circuit breaker '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// A blocking operation was cancelled by runtime shutdown before it finished.
    #[error("blocking call through circuit breaker '{name}' was interrupted")]
    Interrupted { name: String },

    /// The operation's own error.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the call was rejected without being attempted.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// True when the call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The operation's own error, if that is what this is.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: Classify> Classify for BreakerError<E> {
    fn kind(&self) -> FailureKind {
        match self {
            BreakerError::Open { .. } => FailureKind::Unavailable,
            BreakerError::Timeout { .. } => FailureKind::Timeout,
            BreakerError::Interrupted { .. } => FailureKind::Internal,
            BreakerError::Inner(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err: BreakerError<io::Error> = BreakerError::Open {
            name: "firestore".to_string(),
        };
        assert_eq!(err.to_string(), "circuit breaker 'firestore' is open");
        assert!(err.is_open());

        let err: BreakerError<io::Error> = BreakerError::Timeout {
            name: "vertex".to_string(),
            timeout: Duration::from_millis(100),
        };
        assert!(err.to_string().contains("100ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_inner_errors_keep_their_kind() {
        let err = BreakerError::Inner(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(err.kind(), FailureKind::Connection);
        assert!(err.into_inner().is_some());
    }
}

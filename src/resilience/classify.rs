//! Failure classification.
//!
//! A breaker only counts an error against its dependency when the error's
//! [`FailureKind`] is listed in the breaker's `retryable_errors`. Errors that
//! travel through a breaker describe themselves via [`Classify`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io;

/// Coarse category of a failed dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call ran past a deadline.
    Timeout,
    /// Transport failure: refused, reset, broken pipe.
    Connection,
    /// The dependency (or a local resource in front of it) is unavailable.
    Unavailable,
    /// The dependency is shedding load.
    Throttled,
    /// Unexpected failure inside the dependency.
    Internal,
    /// The request was refused on its merits (bad input, not found, denied).
    Rejected,
}

impl FailureKind {
    /// Every kind, in declaration order.
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::Unavailable,
        FailureKind::Throttled,
        FailureKind::Internal,
        FailureKind::Rejected,
    ];

    /// A set containing every kind.
    pub fn all() -> HashSet<FailureKind> {
        Self::ALL.into_iter().collect()
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Throttled => "throttled",
            FailureKind::Internal => "internal",
            FailureKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can be judged by a circuit breaker.
pub trait Classify {
    /// The category this error falls into.
    fn kind(&self) -> FailureKind;
}

impl Classify for io::Error {
    fn kind(&self) -> FailureKind {
        match io::Error::kind(self) {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof => FailureKind::Connection,
            io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::AlreadyExists
            | io::ErrorKind::Unsupported => FailureKind::Rejected,
            io::ErrorKind::OutOfMemory => FailureKind::Unavailable,
            _ => FailureKind::Internal,
        }
    }
}

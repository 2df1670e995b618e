//! Errors surfaced by the connection pool.

use std::time::Duration;
use thiserror::Error;

use crate::resilience::classify::{Classify, FailureKind};

#[derive(Debug, Error)]
pub enum PoolError<E> {
    /// Every connection stayed busy for the whole wait and the pool is full.
    #[error("connection pool '{pool}' exhausted: all {max_connections} connections busy after waiting {waited:?}")]
    Exhausted {
        pool: String,
        max_connections: usize,
        waited: Duration,
    },

    /// The connector failed to authenticate or open a connection.
    #[error(transparent)]
    Backend(E),
}

impl<E> PoolError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }
}

impl<E: Classify> Classify for PoolError<E> {
    fn kind(&self) -> FailureKind {
        match self {
            PoolError::Exhausted { .. } => FailureKind::Unavailable,
            PoolError::Backend(err) => err.kind(),
        }
    }
}

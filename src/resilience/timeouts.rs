//! Timeout enforcement.
//!
//! # Responsibilities
//! - Put a deadline on every call a breaker dispatches
//! - Keep an elapsed deadline distinct from the operation's own errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Dropping the timed-out future is the only cancellation; work already
//!   handed to another thread (`spawn_blocking`) keeps running to completion

use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;

/// Run `future` to completion unless `deadline` passes first.
pub async fn with_deadline<F>(deadline: Duration, future: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(deadline, future).await
}

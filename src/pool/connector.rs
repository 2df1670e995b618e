//! Backend seam for the connection pool.
//!
//! The pool knows nothing about the client it manages. A [`Connector`]
//! authenticates once, opens handles with the resulting credentials, and
//! closes them when the pool lets go.

use async_trait::async_trait;

use crate::resilience::classify::Classify;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The client handle lent to callers.
    type Handle: Send + 'static;

    /// Whatever `authenticate` produces and `connect` consumes.
    type Credentials: Send + Sync + 'static;

    type Error: std::error::Error + Classify + Send + Sync + 'static;

    /// Obtain credentials. Called once per pool initialization.
    async fn authenticate(&self) -> Result<Self::Credentials, Self::Error>;

    /// Open a new handle.
    async fn connect(&self, credentials: &Self::Credentials) -> Result<Self::Handle, Self::Error>;

    /// Release a handle the pool no longer needs.
    async fn close(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        drop(handle);
        Ok(())
    }
}

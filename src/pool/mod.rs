//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     → manager.rs (acquire: reuse idle, grow, or give up)
//!     → connector.rs (authenticate / connect / close against the backend)
//!     → PooledHandle dropped → manager.rs (back to idle)
//!
//! Background:
//!     → cleanup.rs (periodic trim of idle handles down to min_connections)
//! ```

pub mod cleanup;
pub mod connection;
pub mod connector;
pub mod error;
pub mod manager;
pub mod memory;

pub use cleanup::CleanupScheduler;
pub use connection::{ConnectionId, PooledConnection};
pub use connector::Connector;
pub use error::PoolError;
pub use manager::{ConnectionPool, ConnectionPoolConfig, PoolStats, PooledHandle};
pub use memory::{MemoryClient, MemoryConnector, MemoryCredentials, MemoryError};

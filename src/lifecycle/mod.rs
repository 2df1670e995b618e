//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Registry → Pool (authenticate + min connections) → Cleanup task
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop cleanup task → Close pool → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then background tasks
//! - Ordered shutdown: background tasks stop before the pool closes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{bootstrap, ResilienceStack};

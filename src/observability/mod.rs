//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers and pools produce:
//!     → logging.rs (structured log events on transitions, exhaustion, cleanup)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated strings
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;

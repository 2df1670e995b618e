//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Resolve the log filter from the environment, falling back to config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level so operators can override
//!   without editing files

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// `config.log_level` is used when `RUST_LOG` is unset or unparsable, e.g.
/// `"info"` or `"service_resilience=debug"`. Calling this twice is harmless:
/// the second install fails and is ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

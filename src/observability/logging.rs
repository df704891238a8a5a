//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber for the binary
//! - Define the [`Logger`] capability the lifecycle and recovery paths write to
//! - Bridge that capability onto `tracing` events
//!
//! # Design Decisions
//! - Lifecycle messages go through [`Logger`] so embedders can capture them
//! - Fine-grained diagnostics use `tracing` macros directly
//! - Log level configurable via `RUST_LOG`, falling back to the config filter

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sink for formatted lifecycle messages.
///
/// Called concurrently from the accept and shutdown tasks and from request
/// tasks, so implementations must synchronize internally.
pub trait Logger: Send + Sync {
    /// Emit one formatted message at `level`.
    fn log(&self, level: Level, message: &str);
}

/// Forwards every message to a `tracing` event of the same level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            Level::TRACE => tracing::trace!("{message}"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

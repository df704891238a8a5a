//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor / recovery middleware / serving engine produce:
//!     → logging.rs (Logger capability, tracing bridge)
//!     → monitor.rs (panic notifications)
//!     → metrics.rs (counters behind the Monitor capability)
//!
//! Consumers:
//!     → tracing subscriber (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Collaborators are traits so tests can bind recording fakes
//! - Every collaborator has a no-op implementation

pub mod logging;
pub mod metrics;
pub mod monitor;

pub use logging::{Logger, NopLogger, TracingLogger};
pub use metrics::MetricsMonitor;
pub use monitor::{Monitor, NopMonitor};

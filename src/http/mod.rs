//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (from net/)
//!     → server.rs (accept loop, hyper connection, limits)
//!     → [write timeout layer]
//!     → recovery.rs (panic trap via unwind.rs, classify via panic.rs)
//!     → User handler (axum Router)
//!     → Send to client
//! ```

pub mod panic;
pub mod recovery;
pub mod server;
mod unwind;

pub use panic::{BoxError, IgnoredError, IgnoredErrors, Interrupted, PanicValue};
pub use recovery::{Recovery, RecoveryLayer, RequestSnapshot};
pub use server::{HyperEngine, ServeError, ServeOptions, ServingEngine, ShutdownError, ShutdownSignal};

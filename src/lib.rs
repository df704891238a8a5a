//! Lifecycle supervisor for HTTP servers.
//!
//! Owns the listen / serve / shutdown sequence of one server: binds the
//! configured address, serves an axum [`Router`](axum::Router) behind a
//! panic-recovery middleware, and shuts down in two phases (graceful, then
//! hard) with a bounded forced-drain window.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{Config, Options};
pub use http::{ServeError, ServingEngine, ShutdownError, ShutdownSignal};
pub use lifecycle::Supervisor;

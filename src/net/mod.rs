//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → address.rs (network/address parsing)
//!     → listener.rs (SocketBinder: bind, reuse-port)
//!     → listener.rs (optional ListenerAdapter)
//!     → tls.rs (optional TLS termination)
//!     → connection.rs (lifecycle tracking, state machine)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Accepting → Handshaking → Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Decoration order is fixed: raw → adapter → TLS, so adapters see plaintext
//! - Each connection tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod address;
pub mod connection;
pub mod listener;
pub mod tls;

pub use address::ListenAddress;
pub use listener::{Accept, BoxedIo, Endpoint, ListenConfig, Listener, ListenerAdapter, PendingIo, SocketBinder};
pub use tls::TlsListener;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Supervisor::listen()
//!     ├─ startup.rs  (accept task)
//!     │     Idle → Binding → Serving → Closed
//!     └─ shutdown.rs (shutdown watcher)
//!           Idle → SoftShuttingDown → HardShuttingDown → Draining → Closed
//!
//! Supervisor::close() → soft signal
//! Parent token        → hard signal → soft signal
//! signals.rs          → parent token (binary only)
//! ```
//!
//! # Design Decisions
//! - `listen()` returns only when both tasks have concluded
//! - Nothing fails across `listen()` / `close()`; outcomes go to the logger
//! - Shutdown has timeout: forced drain after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

use std::fmt::Debug;

use tokio::sync::watch;

use crate::config::Parameters;

pub use shutdown::CancellationPair;
pub use signals::{cancel_on_signal, shutdown_signal};
pub use startup::ReadySink;

/// Progress of the accept task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptPhase {
    Idle,
    Binding,
    Serving,
    Closed,
}

/// Progress of the shutdown watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Idle,
    SoftShuttingDown,
    HardShuttingDown,
    Draining,
    Closed,
}

/// Observable phase of one lifecycle task.
#[derive(Debug)]
pub(crate) struct PhaseCell<P>(watch::Sender<P>);

impl<P: Copy + Debug + PartialEq> PhaseCell<P> {
    fn new(initial: P) -> Self {
        Self(watch::Sender::new(initial))
    }

    pub(crate) fn set(&self, phase: P) {
        let previous = self.0.send_replace(phase);
        if previous != phase {
            tracing::debug!(from = ?previous, to = ?phase, "Lifecycle phase changed");
        }
    }

    pub(crate) fn get(&self) -> P {
        *self.0.borrow()
    }
}

/// Supervises one server: listen, serve, and a bounded two-phase shutdown.
///
/// Built by [`Options::build`](crate::config::Options::build).
pub struct Supervisor {
    params: Parameters,
    signals: CancellationPair,
    accept_phase: PhaseCell<AcceptPhase>,
    shutdown_phase: PhaseCell<ShutdownPhase>,
}

impl Supervisor {
    pub(crate) fn new(params: Parameters, signals: CancellationPair) -> Self {
        Self {
            params,
            signals,
            accept_phase: PhaseCell::new(AcceptPhase::Idle),
            shutdown_phase: PhaseCell::new(ShutdownPhase::Idle),
        }
    }

    /// Run until shut down.
    ///
    /// Binds and serves while watching for [`close`](Self::close) or parent
    /// cancellation, then drains. Returns once both have concluded.
    pub async fn listen(&self) {
        tokio::join!(
            startup::accept(&self.params, &self.signals, &self.accept_phase),
            shutdown::watch_shutdown(&self.params, &self.signals, &self.shutdown_phase),
        );
    }

    /// Begin a graceful shutdown. Idempotent; does not wait for the drain.
    pub fn close(&self) {
        self.signals.close();
    }

    pub(crate) fn accept_phase(&self) -> AcceptPhase {
        self.accept_phase.get()
    }

    pub(crate) fn shutdown_phase(&self) -> ShutdownPhase {
        self.shutdown_phase.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use std::time::Duration;

    #[tokio::test]
    async fn phases_reach_closed() {
        let supervisor = Options::new()
            .listen_address("")
            .shutdown_timeout(Duration::from_millis(5))
            .force_shutdown_timeout(Duration::from_millis(1))
            .build();

        assert_eq!(supervisor.accept_phase(), AcceptPhase::Idle);
        assert_eq!(supervisor.shutdown_phase(), ShutdownPhase::Idle);

        supervisor.close();
        tokio::time::timeout(Duration::from_secs(1), supervisor.listen())
            .await
            .expect("listen returns after close");

        assert_eq!(supervisor.accept_phase(), AcceptPhase::Closed);
        assert_eq!(supervisor.shutdown_phase(), ShutdownPhase::Closed);
    }

    #[tokio::test]
    async fn serving_phase_while_bound() {
        let supervisor = Options::new()
            .listen_address("127.0.0.1:0")
            .reuse_port(false)
            .build();

        let listening = async {
            supervisor.listen().await;
        };
        let observe = async {
            for _ in 0..100 {
                if supervisor.accept_phase() == AcceptPhase::Serving {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(supervisor.accept_phase(), AcceptPhase::Serving);
            supervisor.close();
        };

        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(listening, observe) })
            .await
            .expect("listen returns after close");
        assert_eq!(supervisor.accept_phase(), AcceptPhase::Closed);
    }
}

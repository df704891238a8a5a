//! Shutdown coordination.
//!
//! # Responsibilities
//! - Derive the soft and hard cancellation signals from a parent token
//! - Drive the serving engine through a bounded graceful shutdown
//! - Give straggling requests a forced-drain window when the bound elapses
//!
//! # Design Decisions
//! - Parent cancellation cascades into the soft signal, so one code path
//!   handles both `close()` and process-level shutdown
//! - The hard signal always fires once the graceful attempt returns
//! - The forced drain is a fixed wait, not an interrupt

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::config::Parameters;
use crate::lifecycle::{PhaseCell, ShutdownPhase};
use crate::observability::Logger;

/// The soft ("stop accepting") and hard ("stop everything") signals.
///
/// `hard` is a child of the parent token and `soft` a child of `hard`:
/// cancelling the parent fires both, cancelling `soft` fires only `soft`.
#[derive(Debug, Clone)]
pub struct CancellationPair {
    soft: CancellationToken,
    hard: CancellationToken,
}

impl CancellationPair {
    pub fn new(parent: &CancellationToken) -> Self {
        let hard = parent.child_token();
        let soft = hard.child_token();
        Self { soft, hard }
    }

    pub fn soft(&self) -> &CancellationToken {
        &self.soft
    }

    pub fn hard(&self) -> &CancellationToken {
        &self.hard
    }

    /// Request a graceful stop. Idempotent.
    pub fn close(&self) {
        self.soft.cancel();
    }
}

/// Wait for the soft signal, then shut the engine down.
///
/// Returns once the server is considered closed: after a clean engine
/// shutdown, or after the forced-drain window following a failed one.
pub(crate) async fn watch_shutdown(params: &Parameters, signals: &CancellationPair, phase: &PhaseCell<ShutdownPhase>) {
    signals.soft().cancelled().await;
    phase.set(ShutdownPhase::SoftShuttingDown);
    params.logger.log(Level::INFO, "Shutting down HTTP server");

    let drained = graceful_shutdown(params, signals, phase).await;

    signals.hard().cancel();
    phase.set(ShutdownPhase::Draining);

    if !drained {
        await_outstanding_requests(params.logger.as_ref(), params.force_shutdown_timeout).await;
    }

    phase.set(ShutdownPhase::Closed);
    params.logger.log(Level::INFO, "HTTP server shutdown complete");
}

/// Ask the engine to drain, bounded by the shutdown timeout and the hard
/// signal. Returns `true` when every request finished in time.
async fn graceful_shutdown(params: &Parameters, signals: &CancellationPair, phase: &PhaseCell<ShutdownPhase>) -> bool {
    phase.set(ShutdownPhase::HardShuttingDown);

    let deadline = signals.hard().child_token();
    let shutdown = params.engine.shutdown(deadline.clone());
    tokio::pin!(shutdown);

    let outcome = tokio::select! {
        outcome = &mut shutdown => outcome,
        () = tokio::time::sleep(params.shutdown_timeout) => {
            deadline.cancel();
            shutdown.await
        }
    };

    match outcome {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, timeout = ?params.shutdown_timeout, "Graceful shutdown incomplete");
            false
        }
    }
}

async fn await_outstanding_requests(logger: &dyn Logger, wait: Duration) {
    logger.log(
        Level::INFO,
        &format!("HTTP request(s) still in flight after shutdown, waiting {wait:?}"),
    );
    tokio::time::sleep(wait).await;
}

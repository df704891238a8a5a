//! Accept task.
//!
//! # Responsibilities
//! - Bind the configured address through the socket binder
//! - Report the bind outcome to the readiness sink, once
//! - Decorate the listener (adapter, then TLS) and hand it to the engine
//!
//! # Design Decisions
//! - Failures are logged, never fatal and never retried
//! - The accept task never triggers shutdown on its own

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::Level;

use crate::config::Parameters;
use crate::http::ServeError;
use crate::lifecycle::shutdown::CancellationPair;
use crate::lifecycle::{AcceptPhase, PhaseCell};
use crate::net::{Listener, TlsListener};

/// One-shot receiver of the bind outcome.
#[derive(Debug, Default)]
pub struct ReadySink(Mutex<Option<oneshot::Sender<bool>>>);

impl ReadySink {
    pub fn new(sender: Option<oneshot::Sender<bool>>) -> Self {
        Self(Mutex::new(sender))
    }

    /// Deliver `ready` if nobody has been notified yet.
    pub fn notify(&self, ready: bool) {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            // The receiver may have been dropped; nobody is listening then.
            let _ = sender.send(ready);
        }
    }
}

pub(crate) async fn accept(params: &Parameters, signals: &CancellationPair, phase: &PhaseCell<AcceptPhase>) {
    let listen = &params.listen;
    if listen.is_disabled() {
        tracing::debug!("No listen address configured, skipping accept");
        phase.set(AcceptPhase::Closed);
        return;
    }

    phase.set(AcceptPhase::Binding);
    params
        .logger
        .log(Level::INFO, &format!("Listening for HTTP traffic on {listen}"));

    let listener = match params.binder.bind(signals.soft(), &listen.network, &listen.address).await {
        Ok(listener) => listener,
        Err(e) => {
            params.ready.notify(false);
            params
                .logger
                .log(Level::WARN, &format!("Unable to listen on {listen}: {e}"));
            phase.set(AcceptPhase::Closed);
            return;
        }
    };
    params.ready.notify(true);

    let listener = decorate(params, listener);
    phase.set(AcceptPhase::Serving);

    match params.engine.serve(listener).await {
        Ok(()) | Err(ServeError::Closed) => {
            params.logger.log(Level::INFO, "HTTP server concluded listening operations");
        }
        Err(e) => {
            params
                .logger
                .log(Level::WARN, &format!("HTTP server stopped serving: {e}"));
        }
    }
    phase.set(AcceptPhase::Closed);
}

/// Raw listener, then the caller's adapter, then TLS.
fn decorate(params: &Parameters, listener: Listener) -> Listener {
    let listener = match &params.adapter {
        Some(adapter) => adapter.adapt(listener),
        None => listener,
    };
    match &params.tls {
        Some(config) => Box::new(TlsListener::new(listener, config.clone())),
        None => listener,
    }
}

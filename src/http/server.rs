//! HTTP serving engine.
//!
//! # Responsibilities
//! - Define the [`ServingEngine`] capability the supervisor drives
//! - Accept connections from a [`Listener`] and serve them with hyper
//!   (HTTP/1.1 and HTTP/2 via auto-detection)
//! - Enforce header size, read, header-read, write and idle limits
//! - Drain open connections on shutdown, bounded by a deadline
//!
//! # Design Decisions
//! - Each connection runs on its own task; the accept loop never blocks on
//!   handshakes or requests
//! - Shutdown stops the accept loop first, then asks every connection to
//!   finish gracefully
//! - Requests carry a [`ShutdownSignal`] so handlers can notice a hard stop

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::timeout::{TimeoutBody, TimeoutLayer};
use tracing::Level;

use crate::http::panic::BoxError;
use crate::net::connection::{Activity, ConnectionGuard, ConnectionState, ConnectionTracker};
use crate::net::listener::{Endpoint, Listener, PendingIo};
use crate::observability::Logger;

/// Pause after an accept error that is not tied to a single connection
/// (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of [`ServingEngine::serve`] other than running forever.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Shutdown began; the listener was closed on purpose.
    #[error("server closed")]
    Closed,
    #[error("{0}")]
    Engine(#[from] BoxError),
}

/// Failure of [`ServingEngine::shutdown`].
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown deadline exceeded with {open} connection(s) still open")]
    DeadlineExceeded { open: usize },
    #[error("{0}")]
    Engine(#[from] BoxError),
}

/// Accepts connections and serves requests until told to stop.
pub trait ServingEngine: Send + Sync {
    /// Serve `listener` until it closes or fails. [`ServeError::Closed`]
    /// reports a clean stop caused by [`shutdown`](Self::shutdown).
    fn serve(&self, listener: Listener) -> BoxFuture<'_, Result<(), ServeError>>;

    /// Stop accepting and wait for in-flight requests until `deadline` fires.
    fn shutdown(&self, deadline: CancellationToken) -> BoxFuture<'_, Result<(), ShutdownError>>;
}

/// Limits applied by [`HyperEngine`]. A zero duration disables that limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOptions {
    /// Largest accepted request line + header block, in bytes.
    pub max_header_bytes: usize,
    /// Deadline for reading a request body.
    pub read_timeout: Duration,
    /// Deadline for receiving the request header block.
    pub read_header_timeout: Duration,
    /// Deadline for the handler to produce a response.
    pub write_timeout: Duration,
    /// Keep-alive connections idle this long are closed.
    pub idle_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            max_header_bytes: 2 * 1024,
            read_timeout: Duration::from_secs(5),
            read_header_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(90),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Request extension that fires when the server shuts down hard.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(CancellationToken);

impl ShutdownSignal {
    pub fn is_shutting_down(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}

/// Default [`ServingEngine`], serving an axum [`Router`] over hyper.
pub struct HyperEngine {
    app: Router,
    options: ServeOptions,
    /// Hard shutdown signal exposed to handlers.
    base: CancellationToken,
    error_logger: Arc<dyn Logger>,
    /// Fired by `shutdown`; stops the accept loop and drains connections.
    stop: CancellationToken,
    tracker: ConnectionTracker,
}

impl HyperEngine {
    #[allow(deprecated)]
    pub fn new(app: Router, options: ServeOptions, base: CancellationToken, error_logger: Arc<dyn Logger>) -> Self {
        let app = if options.write_timeout.is_zero() {
            app
        } else {
            app.layer(TimeoutLayer::new(options.write_timeout))
        };

        Self {
            app,
            options,
            base,
            error_logger,
            stop: CancellationToken::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    fn connection_builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());
        {
            let mut http1 = builder.http1();
            http1.timer(TokioTimer::new()).keep_alive(true);
            if !self.options.read_header_timeout.is_zero() {
                http1.header_read_timeout(self.options.read_header_timeout);
            }
        }
        builder.http2().timer(TokioTimer::new());
        builder
    }

    async fn run(&self, mut listener: Listener) -> Result<(), ServeError> {
        if self.stop.is_cancelled() {
            return Err(ServeError::Closed);
        }

        let builder = self.connection_builder();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP server starting");
        }

        loop {
            let accepted = tokio::select! {
                biased;
                () = self.stop.cancelled() => return Err(ServeError::Closed),
                accepted = listener.accept() => accepted,
            };

            let (pending, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) if is_connection_error(&e) => continue,
                Err(e) => {
                    self.error_logger
                        .log(Level::ERROR, &format!("Accept error: {e}; retrying in {ACCEPT_BACKOFF:?}"));
                    tokio::select! {
                        () = self.stop.cancelled() => return Err(ServeError::Closed),
                        () = tokio::time::sleep(ACCEPT_BACKOFF) => continue,
                    }
                }
            };

            let guard = self.tracker.track();
            tracing::debug!(
                connection_id = %guard.id(),
                peer_addr = %peer,
                open_connections = self.tracker.active_count(),
                "Connection accepted"
            );

            let task = ConnectionTask {
                builder: builder.clone(),
                app: self.app.clone(),
                options: self.options,
                base: self.base.clone(),
                stop: self.stop.clone(),
                error_logger: Arc::clone(&self.error_logger),
                peer,
            };
            tokio::spawn(task.run(pending, guard));
        }
    }

    async fn drain(&self, deadline: CancellationToken) -> Result<(), ShutdownError> {
        self.stop.cancel();
        tokio::select! {
            biased;
            () = self.tracker.wait_for_drain() => Ok(()),
            () = deadline.cancelled() => Err(ShutdownError::DeadlineExceeded {
                open: self.tracker.active_count(),
            }),
        }
    }
}

impl ServingEngine for HyperEngine {
    fn serve(&self, listener: Listener) -> BoxFuture<'_, Result<(), ServeError>> {
        Box::pin(self.run(listener))
    }

    fn shutdown(&self, deadline: CancellationToken) -> BoxFuture<'_, Result<(), ShutdownError>> {
        Box::pin(self.drain(deadline))
    }
}

struct ConnectionTask {
    builder: Builder<TokioExecutor>,
    app: Router,
    options: ServeOptions,
    base: CancellationToken,
    stop: CancellationToken,
    error_logger: Arc<dyn Logger>,
    peer: Endpoint,
}

impl ConnectionTask {
    async fn run(self, pending: PendingIo, guard: ConnectionGuard) {
        let id = guard.id();
        let io = match pending.establish().await {
            Ok(io) => io,
            Err(e) => {
                self.error_logger.log(
                    Level::DEBUG,
                    &format!("Connection {id} from {} could not be established: {e}", self.peer),
                );
                return;
            }
        };

        let activity = Arc::new(Activity::new());
        let service = {
            let app = self.app.clone();
            let base = self.base.clone();
            let options = self.options;
            let activity = Arc::clone(&activity);
            hyper::service::service_fn(move |request: Request<Incoming>| {
                let busy = activity.begin();
                let app = app.clone();
                let base = base.clone();
                async move {
                    let response = dispatch(app, request, options, base).await;
                    drop(busy);
                    Ok::<_, Infallible>(response)
                }
            })
        };

        let conn = self.builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let idle_timeout = self.options.idle_timeout;
        let mut state = ConnectionState::Active;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        self.error_logger.log(Level::DEBUG, &format!("Connection {id} from {} failed: {e}", self.peer));
                    }
                    break;
                }
                () = self.stop.cancelled(), if state == ConnectionState::Active => {
                    state = ConnectionState::Draining;
                    conn.as_mut().graceful_shutdown();
                }
                () = activity.idle_for(idle_timeout), if state == ConnectionState::Active && !idle_timeout.is_zero() => {
                    tracing::trace!(connection_id = %id, idle = ?idle_timeout, "Closing idle connection");
                    state = ConnectionState::Draining;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }

        state = ConnectionState::Closed;
        tracing::trace!(connection_id = %id, peer_addr = %self.peer, state = ?state, "Connection finished");
        drop(guard);
    }
}

async fn dispatch(app: Router, request: Request<Incoming>, options: ServeOptions, base: CancellationToken) -> Response {
    if header_bytes(&request) > options.max_header_bytes {
        return (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request Header Fields Too Large",
        )
            .into_response();
    }

    let mut request = if options.read_timeout.is_zero() {
        request.map(Body::new)
    } else {
        request.map(|body| Body::new(TimeoutBody::new(options.read_timeout, body)))
    };
    request.extensions_mut().insert(ShutdownSignal(base));

    match app.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Size of the request line plus header block, as seen on the wire.
fn header_bytes<B>(request: &Request<B>) -> usize {
    let line = request.method().as_str().len()
        + request.uri().path_and_query().map_or(1, |pq| pq.as_str().len())
        + "HTTP/1.1".len()
        + 4;
    let headers: usize = request
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum();
    line + headers
}

/// Errors that only affect the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

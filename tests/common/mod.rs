//! Shared fakes for integration testing.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use http_supervisor::http::{PanicValue, RequestSnapshot, ServeError, ServingEngine, ShutdownError};
use http_supervisor::net::{Accept, Endpoint, Listener, PendingIo, SocketBinder};
use http_supervisor::observability::{Logger, Monitor};

pub mod tls;

/// Logger that keeps every line.
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, message)| message).collect()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

/// Monitor that counts notifications.
#[derive(Default)]
pub struct RecordingMonitor {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingMonitor {
    /// `(request path, panic value)` per notification.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Monitor for RecordingMonitor {
    fn panic_recovered(&self, request: &RequestSnapshot, value: &PanicValue) {
        self.calls
            .lock()
            .unwrap()
            .push((request.uri.path().to_string(), value.to_string()));
    }
}

/// Listener that never yields a connection.
pub struct IdleListener {
    pub endpoint: Endpoint,
}

impl IdleListener {
    pub fn boxed(endpoint: Endpoint) -> Listener {
        Box::new(Self { endpoint })
    }
}

impl Accept for IdleListener {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(PendingIo, Endpoint)>> {
        Box::pin(std::future::pending())
    }

    fn local_addr(&self) -> io::Result<Endpoint> {
        Ok(self.endpoint.clone())
    }
}

pub fn loopback() -> Endpoint {
    Endpoint::Tcp(SocketAddr::from(([127, 0, 0, 1], 0)))
}

/// Binder that records what it was asked to bind.
pub struct FakeBinder {
    fail_with: Option<io::ErrorKind>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeBinder {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(kind: io::ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(kind),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SocketBinder for FakeBinder {
    fn bind<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        network: &'a str,
        address: &'a str,
    ) -> BoxFuture<'a, io::Result<Listener>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((network.to_string(), address.to_string()));
            match self.fail_with {
                Some(kind) => Err(io::Error::new(kind, "bind refused")),
                None => Ok(IdleListener::boxed(loopback())),
            }
        })
    }
}

/// How [`FakeEngine::shutdown`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Everything drained at once.
    Immediate,
    /// Requests never finish; resolve with an error when the deadline fires.
    Stall,
}

type ServeHook = Box<dyn FnOnce() + Send>;

/// Engine that records calls instead of serving.
pub struct FakeEngine {
    serve_error: Option<String>,
    drain: Drain,
    stop: CancellationToken,
    serve_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    served: Mutex<Vec<Endpoint>>,
    deadline_expired_on_entry: Mutex<Vec<bool>>,
    on_serve: Mutex<Option<ServeHook>>,
}

impl FakeEngine {
    pub fn new(drain: Drain) -> Self {
        Self {
            serve_error: None,
            drain,
            stop: CancellationToken::new(),
            serve_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            served: Mutex::new(Vec::new()),
            deadline_expired_on_entry: Mutex::new(Vec::new()),
            on_serve: Mutex::new(None),
        }
    }

    /// `serve` fails at once with `message`.
    pub fn failing_serve(mut self, message: &str) -> Self {
        self.serve_error = Some(message.to_string());
        self
    }

    /// Run `hook` when `serve` is entered.
    pub fn on_serve(self, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.on_serve.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn serve_calls(&self) -> usize {
        self.serve_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Local addresses of the listeners handed to `serve`.
    pub fn served(&self) -> Vec<Endpoint> {
        self.served.lock().unwrap().clone()
    }

    /// Whether the deadline had already fired when each `shutdown` started.
    pub fn deadline_expired_on_entry(&self) -> Vec<bool> {
        self.deadline_expired_on_entry.lock().unwrap().clone()
    }
}

impl ServingEngine for FakeEngine {
    fn serve(&self, listener: Listener) -> BoxFuture<'_, Result<(), ServeError>> {
        Box::pin(async move {
            self.serve_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(endpoint) = listener.local_addr() {
                self.served.lock().unwrap().push(endpoint);
            }
            let hook = self.on_serve.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }

            if let Some(message) = &self.serve_error {
                return Err(ServeError::Engine(message.clone().into()));
            }
            self.stop.cancelled().await;
            Err(ServeError::Closed)
        })
    }

    fn shutdown(&self, deadline: CancellationToken) -> BoxFuture<'_, Result<(), ShutdownError>> {
        Box::pin(async move {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            self.deadline_expired_on_entry
                .lock()
                .unwrap()
                .push(deadline.is_cancelled());
            self.stop.cancel();

            match self.drain {
                Drain::Immediate => Ok(()),
                Drain::Stall => {
                    deadline.cancelled().await;
                    Err(ShutdownError::DeadlineExceeded { open: 1 })
                }
            }
        })
    }
}

//! Panic-isolating request middleware.
//!
//! # Responsibilities
//! - Catch panics raised while a handler runs (synchronously or while polled)
//! - Drain what is left of the request body
//! - Report non-ignored panics to the monitor and the logger
//! - Answer with a generic 500
//!
//! # Design Decisions
//! - The request body lives in a shared slot: after unwinding, the unread
//!   remainder is still reachable for draining and for the request dump
//! - Dumps are sanitised to printable ASCII so a request cannot inject
//!   control characters into logs
//! - Nothing here re-panics or propagates a failure

use std::backtrace::Backtrace;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderMap, Method, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tower::{Layer, Service};
use tracing::Level;

use crate::http::panic::{IgnoredErrors, PanicValue};
use crate::http::unwind::{install_panic_hook, CatchPanic};
use crate::observability::{Logger, Monitor};

/// Upper bound on body bytes read after a panic.
const MAX_DRAIN_BYTES: usize = 64 * 1024;

/// Upper bound on time spent reading them.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Replacement for bytes that are unsafe to write to a log.
const PLACEHOLDER: char = '?';

/// The parts of a request that outlive its handler.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestSnapshot {
    fn from_parts(parts: &Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }
}

#[derive(Clone)]
struct RecoveryPolicy {
    ignored: IgnoredErrors,
    monitor: Arc<dyn Monitor>,
    logger: Arc<dyn Logger>,
    dump_requests: bool,
}

/// Wraps services with [`Recovery`].
#[derive(Clone)]
pub struct RecoveryLayer {
    policy: RecoveryPolicy,
}

impl RecoveryLayer {
    /// Recovery with the default ignored errors and request dumps off.
    ///
    /// Installs a process-wide panic hook on first use so caught panics
    /// are reported here instead of on stderr.
    pub fn new(monitor: Arc<dyn Monitor>, logger: Arc<dyn Logger>) -> Self {
        install_panic_hook();
        Self {
            policy: RecoveryPolicy {
                ignored: IgnoredErrors::default(),
                monitor,
                logger,
                dump_requests: false,
            },
        }
    }

    pub fn ignored_errors(mut self, ignored: IgnoredErrors) -> Self {
        self.policy.ignored = ignored;
        self
    }

    /// Append a sanitised dump of the request to every panic log entry.
    pub fn dump_requests(mut self, enabled: bool) -> Self {
        self.policy.dump_requests = enabled;
        self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = Recovery<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recovery {
            inner,
            policy: Arc::new(self.policy.clone()),
        }
    }
}

/// Middleware that turns handler panics into `500 Internal Server Error`.
#[derive(Clone)]
pub struct Recovery<S> {
    inner: S,
    policy: Arc<RecoveryPolicy>,
}

impl<S> Service<Request<Body>> for Recovery<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response<Body>, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // `inner` was driven to readiness; hand that instance to this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let policy = Arc::clone(&self.policy);

        let (parts, body) = request.into_parts();
        let snapshot = RequestSnapshot::from_parts(&parts);
        let slot = BodySlot::new(body);
        let request = Request::from_parts(parts, Body::new(SlotBody(slot.clone())));

        Box::pin(async move {
            match CatchPanic::new(async move { inner.call(request).await }).await {
                Ok(result) => result,
                Err(caught) => {
                    let ignored = policy.ignored.is_ignored_payload(caught.payload.as_ref());
                    let value = PanicValue::from_payload(caught.payload);
                    Ok(policy.recover(&value, ignored, &caught.backtrace, &snapshot, slot).await)
                }
            }
        })
    }
}

impl RecoveryPolicy {
    /// `ignored_payload` is set when the raw payload already matched the
    /// ignored set before it was classified.
    async fn recover(
        &self,
        value: &PanicValue,
        ignored_payload: bool,
        backtrace: &Backtrace,
        snapshot: &RequestSnapshot,
        slot: BodySlot,
    ) -> Response<Body> {
        let remaining = drain(slot).await;

        if !ignored_payload && !self.ignored.is_ignored(value) {
            self.monitor.panic_recovered(snapshot, value);
            self.logger
                .log(Level::ERROR, &self.entry(value, backtrace, snapshot, &remaining));
        }

        internal_server_error()
    }

    fn entry(
        &self,
        value: &PanicValue,
        backtrace: &Backtrace,
        snapshot: &RequestSnapshot,
        remaining: &Result<Bytes, String>,
    ) -> String {
        let mut entry = format!("Recovered panic: {value}\n{backtrace}");
        if self.dump_requests {
            entry.push('\n');
            entry.push_str(&sanitize(&dump_request(snapshot, remaining)));
        }
        entry
    }
}

/// Read whatever the handler left unread, within size and time bounds.
async fn drain(slot: BodySlot) -> Result<Bytes, String> {
    let Some(body) = slot.take() else {
        return Ok(Bytes::new());
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, axum::body::to_bytes(Body::new(body), MAX_DRAIN_BYTES)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {DRAIN_TIMEOUT:?}")),
    }
}

fn dump_request(snapshot: &RequestSnapshot, remaining: &Result<Bytes, String>) -> Vec<u8> {
    let mut dump = format!("{} {} {:?}\r\n", snapshot.method, snapshot.uri, snapshot.version).into_bytes();
    for (name, value) in &snapshot.headers {
        dump.extend_from_slice(name.as_str().as_bytes());
        dump.extend_from_slice(b": ");
        dump.extend_from_slice(value.as_bytes());
        dump.extend_from_slice(b"\r\n");
    }
    dump.extend_from_slice(b"\r\n");
    match remaining {
        Ok(body) => dump.extend_from_slice(body),
        Err(e) => dump.extend_from_slice(format!("[body unreadable: {e}]").as_bytes()),
    }
    dump
}

/// Keep printable ASCII, newlines and tabs; replace everything else.
fn sanitize(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| match b {
            b'\n' | b'\t' | 0x20..=0x7e => b as char,
            _ => PLACEHOLDER,
        })
        .collect()
}

fn internal_server_error() -> Response<Body> {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::X_CONTENT_TYPE_OPTIONS, "nosniff")],
        "Internal Server Error",
    )
        .into_response()
}

type PinnedBody = Pin<Box<Body>>;

/// Request body shared between the handler and the recovery path.
#[derive(Clone)]
struct BodySlot(Arc<Mutex<Option<PinnedBody>>>);

impl BodySlot {
    fn new(body: Body) -> Self {
        Self(Arc::new(Mutex::new(Some(Box::pin(body)))))
    }

    fn take(&self) -> Option<PinnedBody> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PinnedBody>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The handler's view of a [`BodySlot`].
struct SlotBody(BodySlot);

impl HttpBody for SlotBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        match self.0.lock().as_mut() {
            Some(body) => body.as_mut().poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.0.lock().as_ref().map_or(true, |body| body.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.0
            .lock()
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |body| body.size_hint())
    }
}

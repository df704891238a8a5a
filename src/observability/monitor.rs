//! Panic monitoring hook.

use crate::http::panic::PanicValue;
use crate::http::recovery::RequestSnapshot;

/// Notified once for every reportable panic recovered from a handler.
///
/// Fire-and-forget: the recovery path does not wait on anything the monitor
/// starts, so implementations should return promptly.
pub trait Monitor: Send + Sync {
    fn panic_recovered(&self, request: &RequestSnapshot, value: &PanicValue);
}

/// Ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMonitor;

impl Monitor for NopMonitor {
    fn panic_recovered(&self, _request: &RequestSnapshot, _value: &PanicValue) {}
}

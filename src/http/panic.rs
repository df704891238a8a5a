//! Panic payload classification.
//!
//! A handler panic carries an arbitrary payload. [`PanicValue`] recovers what
//! it can from it (an error with its source chain, a message, or nothing),
//! and [`IgnoredErrors`] decides whether the panic is an expected artifact of
//! cancellation or timeouts rather than a bug.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Conventional "work was cut short" errors.
///
/// Handlers that abort by panicking with one of these (directly or as the
/// source of another error) are not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation canceled")]
    Canceled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("transaction has already been committed or rolled back")]
    TransactionDone,
}

/// What a handler panicked with.
#[derive(Debug)]
pub enum PanicValue {
    Error(BoxError),
    Message(String),
    /// A payload of a type we cannot inspect.
    Opaque,
}

impl PanicValue {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<BoxError>() {
            Ok(err) => return PanicValue::Error(*err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Interrupted>() {
            Ok(err) => return PanicValue::Error(err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<io::Error>() {
            Ok(err) => return PanicValue::Error(err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<tokio::time::error::Elapsed>() {
            Ok(err) => return PanicValue::Error(err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return PanicValue::Message(*message),
            Err(payload) => payload,
        };
        match payload.downcast::<&'static str>() {
            Ok(message) => PanicValue::Message((*message).to_string()),
            Err(_) => PanicValue::Opaque,
        }
    }

    pub fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PanicValue::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for PanicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanicValue::Error(err) => write!(f, "{err}"),
            PanicValue::Message(message) => f.write_str(message),
            PanicValue::Opaque => f.write_str("Box<dyn Any>"),
        }
    }
}

/// Matches one kind of error anywhere in a source chain.
#[derive(Clone, Copy)]
pub struct IgnoredError {
    name: &'static str,
    matches: fn(&(dyn Error + 'static)) -> bool,
    /// Matches the raw panic payload, for errors raised with `panic_any`
    /// that [`PanicValue`] cannot recover as an error.
    payload: fn(&(dyn Any + Send)) -> bool,
}

impl IgnoredError {
    pub const CANCELED: Self = Self {
        name: "canceled",
        matches: |err| err.downcast_ref::<Interrupted>() == Some(&Interrupted::Canceled),
        payload: |_| false,
    };

    pub const DEADLINE_EXCEEDED: Self = Self {
        name: "deadline exceeded",
        matches: |err| {
            err.downcast_ref::<Interrupted>() == Some(&Interrupted::DeadlineExceeded)
                || err.is::<tokio::time::error::Elapsed>()
        },
        payload: |_| false,
    };

    pub const TRANSACTION_DONE: Self = Self {
        name: "transaction done",
        matches: |err| err.downcast_ref::<Interrupted>() == Some(&Interrupted::TransactionDone),
        payload: |_| false,
    };

    /// Ignore every error of type `E`, whether it is boxed as an error,
    /// wrapped by another error, or passed to `panic_any` as is.
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>(),
            matches: |err| err.is::<E>(),
            payload: |payload| payload.is::<E>(),
        }
    }

    pub fn new(name: &'static str, matches: fn(&(dyn Error + 'static)) -> bool) -> Self {
        Self {
            name,
            matches,
            payload: |_| false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn matches_chain(&self, err: &(dyn Error + 'static)) -> bool {
        std::iter::successors(Some(err), |&e| e.source()).any(self.matches)
    }
}

impl fmt::Debug for IgnoredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IgnoredError").field(&self.name).finish()
    }
}

/// The set of errors whose panics are suppressed from reporting.
#[derive(Debug, Clone)]
pub struct IgnoredErrors(Vec<IgnoredError>);

impl IgnoredErrors {
    pub fn new(errors: impl IntoIterator<Item = IgnoredError>) -> Self {
        Self(errors.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// `true` when `value` is an error that is, or wraps, an ignored error.
    /// Messages and opaque payloads are never ignored.
    pub fn is_ignored(&self, value: &PanicValue) -> bool {
        value
            .as_error()
            .is_some_and(|err| self.0.iter().any(|ignored| ignored.matches_chain(err)))
    }

    /// `true` when a raw panic payload is itself an ignored error type.
    pub fn is_ignored_payload(&self, payload: &(dyn Any + Send)) -> bool {
        self.0.iter().any(|ignored| (ignored.payload)(payload))
    }
}

impl Default for IgnoredErrors {
    fn default() -> Self {
        Self::new([
            IgnoredError::CANCELED,
            IgnoredError::DEADLINE_EXCEEDED,
            IgnoredError::TRANSACTION_DONE,
        ])
    }
}

//! Catching handler panics with the backtrace of the panicking frame.
//!
//! # Design Decisions
//! - A process-wide panic hook records the backtrace while the panicking
//!   stack is still intact; by the time `catch_unwind` returns it is gone
//! - Panics raised inside a [`CatchPanic`] poll are not printed by the
//!   previous hook, they are reported by the recovery middleware instead
//! - Any other panic goes to the previously installed hook unchanged

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

static HOOK: Once = Once::new();

thread_local! {
    /// Depth of [`CatchPanic`] polls on this thread.
    static CATCHING: Cell<usize> = const { Cell::new(0) };
    static CAPTURED: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Chain the capturing hook in front of the current one. Idempotent.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !capture_if_catching() {
                previous(info);
            }
        }));
    });
}

/// Record a backtrace when called under a [`CatchPanic`] poll.
fn capture_if_catching() -> bool {
    // Thread-locals may already be torn down when a thread panics on exit.
    if CATCHING.try_with(Cell::get).unwrap_or(0) == 0 {
        return false;
    }
    CAPTURED
        .try_with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()))
        .is_ok()
}

struct CatchScope;

impl CatchScope {
    fn enter() -> Self {
        CATCHING.set(CATCHING.get() + 1);
        Self
    }
}

impl Drop for CatchScope {
    fn drop(&mut self) {
        CATCHING.set(CATCHING.get().saturating_sub(1));
    }
}

/// A panic caught by [`CatchPanic`].
pub(crate) struct CaughtPanic {
    pub payload: Box<dyn Any + Send>,
    /// Where the panic was raised. Falls back to the catching frame when
    /// the hook was replaced after installation.
    pub backtrace: Backtrace,
}

/// Polls a future, turning a panic in any poll into [`CaughtPanic`].
pub(crate) struct CatchPanic<F> {
    future: Pin<Box<F>>,
}

impl<F: Future> CatchPanic<F> {
    pub(crate) fn new(future: F) -> Self {
        Self {
            future: Box::pin(future),
        }
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, CaughtPanic>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let future = self.future.as_mut();
        let polled = {
            let _scope = CatchScope::enter();
            panic::catch_unwind(AssertUnwindSafe(|| future.poll(cx)))
        };

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => {
                let backtrace = CAPTURED.take().unwrap_or_else(Backtrace::force_capture);
                Poll::Ready(Err(CaughtPanic { payload, backtrace }))
            }
        }
    }
}

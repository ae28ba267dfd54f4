//! Panic containment.
//!
//! A panic inside a handler or stage is caught before it reaches the transport
//! and converted into [`AppError::Fault`]. The stack of the panic site is taken
//! by a process-wide panic hook, which stores it in a thread-local slot while a
//! guarded call is running on that thread. Panics outside a guarded call are
//! forwarded to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use beacon_core::{AppError, TelemetryContext};
use futures_util::FutureExt;
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::KeyValue;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the stack-capturing panic hook. Idempotent.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }

            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let stack = format!("at {location}\n{}", Backtrace::force_capture());
            LAST_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
        }));
    });
}

/// A panic caught by [`catch_panic`] or [`catch_panic_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtPanic {
    message: String,
    stack: String,
}

impl CaughtPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        let stack = LAST_STACK
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_default();

        Self { message, stack }
    }

    /// The panic payload as text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The captured stack of the panic site.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Marks the active span failed and converts the panic into a fault error.
    pub fn into_fault(self, telemetry: &TelemetryContext) -> AppError {
        let span = telemetry.otel().span();
        span.set_status(Status::error("panic recovered"));
        span.set_attribute(KeyValue::new("panic.error", self.message.clone()));
        span.set_attribute(KeyValue::new("panic.stack", self.stack.clone()));
        span.add_event(
            "exception",
            vec![
                KeyValue::new("exception.type", "panic"),
                KeyValue::new("exception.message", self.message.clone()),
                KeyValue::new("exception.stacktrace", self.stack.clone()),
            ],
        );

        AppError::fault(self.message, self.stack)
    }
}

/// Runs `future` to completion, catching any panic raised while polling it.
pub async fn catch_panic<F: Future>(future: F) -> Result<F::Output, CaughtPanic> {
    install_panic_hook();
    AssertUnwindSafe(Guarded {
        inner: Box::pin(future),
    })
    .catch_unwind()
    .await
    .map_err(CaughtPanic::from_payload)
}

/// Calls `f`, catching any panic it raises.
pub fn catch_panic_sync<R>(f: impl FnOnce() -> R) -> Result<R, CaughtPanic> {
    install_panic_hook();
    panic::catch_unwind(AssertUnwindSafe(|| {
        let _guard = DepthGuard::enter();
        f()
    }))
    .map_err(CaughtPanic::from_payload)
}

/// Marks every poll of the inner future as a guarded call.
struct Guarded<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Guarded<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _guard = DepthGuard::enter();
        self.inner.as_mut().poll(cx)
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_panic_passes_output_through() {
        let result = catch_panic(async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_catch_panic_captures_message_and_stack() {
        let caught = catch_panic(async {
            tokio::task::yield_now().await;
            panic!("THIS IS A TEST PANIC");
        })
        .await
        .unwrap_err();

        assert_eq!(caught.message(), "THIS IS A TEST PANIC");
        assert!(caught.stack().contains("fault.rs"));
    }

    #[test]
    fn test_catch_panic_sync_formatted_payload() {
        let id = 42;
        let caught = catch_panic_sync::<()>(|| panic!("user {id} exploded")).unwrap_err();
        assert_eq!(caught.message(), "user 42 exploded");
        assert!(!caught.stack().is_empty());
    }

    #[test]
    fn test_guard_depth_resets_after_panic() {
        let _ = catch_panic_sync::<()>(|| panic!("first"));
        assert_eq!(GUARD_DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn test_into_fault_without_span() {
        let caught = catch_panic_sync::<()>(|| panic!("no span here")).unwrap_err();
        let err = caught.into_fault(&TelemetryContext::new());

        assert!(err.is_fault());
        assert_eq!(err.public_message(), beacon_core::FAULT_MESSAGE);
    }
}

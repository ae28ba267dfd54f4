//! Request telemetry context.
//!
//! The [`TelemetryContext`] carries trace identity and the request deadline
//! through the middleware pipeline, into handlers, and into every outbound
//! call they make.

use std::time::{Duration, Instant};

use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;

/// Per-request telemetry carrier.
///
/// A context is produced once per inbound request. The tracing stage stores the
/// server span in it; later stages and handlers annotate the active span through
/// it. When tracing is disabled the context holds no span and every attribute
/// write is a no-op.
///
/// Cancellation follows future drop: when the client goes away or the deadline
/// passes, the request future is dropped together with any pending I/O.
///
/// # Example
///
/// ```
/// use beacon_core::TelemetryContext;
/// use opentelemetry::KeyValue;
///
/// let ctx = TelemetryContext::new();
/// assert!(ctx.trace_id().is_none());
///
/// // Safe without an active span
/// ctx.set_attribute(KeyValue::new("cache.hit", true));
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    /// OpenTelemetry context holding the active span (if any).
    otel: Context,

    /// Tracer used for child spans; absent when tracing is disabled.
    tracer: Option<Tracer>,

    /// When the request must be finished.
    deadline: Option<Instant>,

    /// When the request started processing.
    started_at: Instant,
}

impl TelemetryContext {
    /// Creates an empty context with no span and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            otel: Context::new(),
            tracer: None,
            deadline: None,
            started_at: Instant::now(),
        }
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(self.started_at + timeout);
        self
    }

    /// Returns the underlying OpenTelemetry context.
    #[must_use]
    pub fn otel(&self) -> &Context {
        &self.otel
    }

    /// Replaces the OpenTelemetry context and the tracer used for child spans.
    ///
    /// Called by the tracing stage once the server span is started.
    pub fn attach(&mut self, otel: Context, tracer: Tracer) {
        self.otel = otel;
        self.tracer = Some(tracer);
    }

    /// Returns true if a valid span is active.
    #[must_use]
    pub fn has_span(&self) -> bool {
        self.otel.span().span_context().is_valid()
    }

    /// Returns the active trace ID as lowercase hex, if a span is active.
    #[must_use]
    pub fn trace_id(&self) -> Option<String> {
        let span = self.otel.span();
        let sc = span.span_context();
        sc.is_valid().then(|| sc.trace_id().to_string())
    }

    /// Returns the active span ID as lowercase hex, if a span is active.
    #[must_use]
    pub fn span_id(&self) -> Option<String> {
        let span = self.otel.span();
        let sc = span.span_context();
        sc.is_valid().then(|| sc.span_id().to_string())
    }

    /// Sets an attribute on the active span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.otel.span().set_attribute(attribute);
    }

    /// Sets several attributes on the active span.
    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        self.otel.span().set_attributes(attributes);
    }

    /// Starts an internal child span of the active span.
    ///
    /// The child ends when [`end`](Self::end) is called or when the last clone of
    /// the returned context is dropped. Without a tracer the returned context is
    /// a plain clone of `self`.
    #[must_use]
    pub fn child(&self, name: &'static str) -> Self {
        let Some(tracer) = &self.tracer else {
            return self.clone();
        };

        let span = tracer
            .span_builder(name)
            .with_kind(SpanKind::Internal)
            .start_with_context(tracer, &self.otel);

        Self {
            otel: self.otel.with_span(span),
            tracer: self.tracer.clone(),
            deadline: self.deadline,
            started_at: self.started_at,
        }
    }

    /// Ends the active span.
    pub fn end(&self) {
        self.otel.span().end();
    }

    /// Returns when the request started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the request deadline, if one was set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    ///
    /// `None` means no deadline; `Some(Duration::ZERO)` means it has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

impl Default for TelemetryContext {
    fn default() -> Self {
        Self::new()
    }
}

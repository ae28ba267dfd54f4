//! Tracing middleware.
//!
//! This middleware opens the OpenTelemetry server span for each request. The
//! parent context is extracted from incoming headers with the global
//! propagator, and the span context is injected into the response headers.
//!
//! ## Trace Context Propagation
//!
//! Supports the [W3C Trace Context](https://www.w3.org/TR/trace-context/) standard
//! plus W3C baggage, through whatever propagator is installed globally:
//! - `traceparent` - Contains trace ID, span ID, and trace flags
//! - `tracestate` - Vendor-specific trace information
//!
//! ## Span Attributes
//!
//! The span is named `"<METHOD> <route>"` and carries:
//! - `service.name` - This service
//! - `http.method` - HTTP method
//! - `http.url` - Request URL
//! - `http.target` - Request path and query
//! - `http.client_ip` - Peer address
//! - `http.user_agent` - `User-Agent` header
//! - `http.status_code` - Effective status (added on completion)

use beacon_telemetry::{extract_context, inject_context, HeaderExtractor, HeaderInjector};
use http::header::USER_AGENT;
use beacon_telemetry::logging::fields;
use opentelemetry::trace::{FutureExt as _, SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{effective_status, HandlerResult, Request};

/// The W3C Trace Context header for trace propagation.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The W3C Trace State header for vendor-specific data.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Middleware that opens the request's server span.
///
/// # Behavior
///
/// 1. Extract the parent context from the request headers
/// 2. Start a `Server` span under it and store it in the [`MiddlewareContext`]
/// 3. Stamp its ids on the enclosing `request` log span, then run the rest of
///    the chain with the span's context current
/// 4. Record the effective status and, on error, the error and the client
///    message as span status
/// 5. Inject the context into the response headers and end the span
///
/// The stage is left out of the pipeline entirely when tracing is disabled.
#[derive(Debug, Clone)]
pub struct TracingStage {
    /// The service name for span attributes.
    service_name: String,

    /// Tracer that creates server spans.
    tracer: Tracer,
}

impl TracingStage {
    /// Creates a new tracing stage.
    #[must_use]
    pub fn new(service_name: impl Into<String>, tracer: Tracer) -> Self {
        Self {
            service_name: service_name.into(),
            tracer,
        }
    }

    fn baseline_attributes(&self, ctx: &MiddlewareContext, request: &Request) -> Vec<KeyValue> {
        let target = request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("http.method", request.method().to_string()),
            KeyValue::new("http.url", request.uri().to_string()),
            KeyValue::new("http.target", target),
            KeyValue::new(
                "http.client_ip",
                ctx.client_ip().unwrap_or_default().to_string(),
            ),
            KeyValue::new("http.user_agent", user_agent),
        ]
    }
}

impl Middleware for TracingStage {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let parent = extract_context(&HeaderExtractor(request.headers()));
            let span_name = format!(
                "{} {}",
                request.method(),
                ctx.route_or(request.uri().path())
            );

            let span = self
                .tracer
                .span_builder(span_name)
                .with_kind(SpanKind::Server)
                .with_attributes(self.baseline_attributes(ctx, &request))
                .start_with_context(&self.tracer, &parent);
            let cx = parent.with_span(span);
            ctx.telemetry_mut().attach(cx.clone(), self.tracer.clone());

            let log_span = tracing::Span::current();
            if let Some(trace_id) = ctx.telemetry().trace_id() {
                log_span.record(fields::TRACE_ID, tracing::field::display(trace_id));
            }
            if let Some(span_id) = ctx.telemetry().span_id() {
                log_span.record(fields::SPAN_ID, tracing::field::display(span_id));
            }

            let result = next.run(ctx, request).with_context(cx.clone()).await;

            let span = cx.span();
            span.set_attribute(KeyValue::new(
                "http.status_code",
                i64::from(effective_status(&result).as_u16()),
            ));

            match result {
                Ok(mut response) => {
                    inject_context(&cx, &mut HeaderInjector(response.headers_mut()));
                    span.end();
                    Ok(response)
                }
                Err(err) => {
                    span.record_error(&err);
                    span.set_status(Status::error(err.public_message().to_string()));
                    inject_context(&cx, &mut HeaderInjector(ctx.deferred_headers_mut()));
                    span.end();
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use beacon_core::{AppError, TelemetryContext};
    use bytes::Bytes;
    use http::StatusCode;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn stage() -> (TracingStage, InMemorySpanExporter, TracerProvider) {
        beacon_telemetry::tracing::install_propagator();
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let stage = TracingStage::new("beacon-test", provider.tracer("test"));
        (stage, exporter, provider)
    }

    fn attr(span: &SpanData, key: &str) -> Option<Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.clone())
    }

    fn request(path: &str) -> Request {
        http::Request::builder()
            .method("GET")
            .uri(path)
            .header("user-agent", "curl/8.5")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_server_span_named_after_route() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::new(TelemetryContext::new())
            .with_route("/api/users/:id")
            .with_client_ip("10.1.2.3");
        let next = Next::handler(|ctx, _req| {
            assert!(ctx.telemetry().has_span());
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        });

        let response = stage
            .process(&mut ctx, request("/api/users/42"), next)
            .await
            .unwrap();
        assert!(response.headers().contains_key(TRACEPARENT_HEADER));

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "GET /api/users/:id");
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(attr(span, "http.method"), Some(Value::from("GET")));
        assert_eq!(attr(span, "http.target"), Some(Value::from("/api/users/42")));
        assert_eq!(attr(span, "http.client_ip"), Some(Value::from("10.1.2.3")));
        assert_eq!(attr(span, "http.user_agent"), Some(Value::from("curl/8.5")));
        assert_eq!(attr(span, "http.status_code"), Some(Value::from(200_i64)));
    }

    #[tokio::test]
    async fn test_unmatched_route_uses_raw_path() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::default();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Err(AppError::not_found("Cannot GET /nowhere")) })
        });

        let _ = stage.process(&mut ctx, request("/nowhere"), next).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "GET /nowhere");
    }

    #[tokio::test]
    async fn test_parent_context_is_continued() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::default();
        let mut request = request("/");
        request
            .headers_mut()
            .insert(TRACEPARENT_HEADER, TRACEPARENT.parse().unwrap());
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
        });

        let response = stage.process(&mut ctx, request, next).await.unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert_eq!(
            span.span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(span.parent_span_id.to_string(), "00f067aa0ba902b7");

        let outgoing = response.headers()[TRACEPARENT_HEADER].to_str().unwrap();
        assert!(outgoing.contains("4bf92f3577b34da6a3ce929d0e0e4736"));
        assert!(!outgoing.contains("00f067aa0ba902b7"));
    }

    #[tokio::test]
    async fn test_error_marks_span_and_defers_headers() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::default();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Err(AppError::bad_request("This is a deliberate error")) })
        });

        let err = stage
            .process(&mut ctx, request("/debug/error"), next)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0].status,
            Status::error("This is a deliberate error")
        );
        assert_eq!(
            attr(&spans[0], "http.status_code"),
            Some(Value::from(400_i64))
        );
        assert!(ctx.deferred_headers_mut().contains_key(TRACEPARENT_HEADER));
    }

    #[tokio::test]
    async fn test_handler_panic_marks_span() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::default();
        let next = Next::handler(|_ctx, _req| Box::pin(simulated_panic()));

        let err = stage
            .process(&mut ctx, request("/api/panic"), next)
            .await
            .unwrap_err();
        assert!(err.is_fault());

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert!(matches!(span.status, Status::Error { .. }));
        assert_eq!(
            attr(span, "panic.error"),
            Some(Value::from("This is a simulated panic!"))
        );
        assert!(attr(span, "panic.stack").is_some());
        assert!(span.events.events.iter().any(|e| e.name == "exception"));
        assert_eq!(attr(span, "http.status_code"), Some(Value::from(500_i64)));
    }

    #[tokio::test]
    async fn test_dependency_cause_stays_out_of_status() {
        let (stage, exporter, _provider) = stage();
        let mut ctx = MiddlewareContext::default();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async {
                Err(AppError::dependency(
                    "Failed to fetch user",
                    anyhow::anyhow!("password authentication failed for user \"beacon\""),
                ))
            })
        });

        let _ = stage.process(&mut ctx, request("/api/users/1"), next).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::error("Failed to fetch user"));
        let exception = spans[0]
            .events
            .events
            .iter()
            .find(|e| e.name == "exception")
            .unwrap();
        assert!(exception
            .attributes
            .iter()
            .any(|kv| kv.value.as_str().contains("password authentication failed")));
    }

    async fn simulated_panic() -> HandlerResult {
        panic!("This is a simulated panic!")
    }
}

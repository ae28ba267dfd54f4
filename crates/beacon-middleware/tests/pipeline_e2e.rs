//! End-to-end pipeline integration tests.
//!
//! These tests run requests through the full fixed pipeline and verify the
//! per-request guarantees across success, error and panic outcomes:
//!
//! 1. Recovery - panics become `500 {"error":"Internal Server Error"}`
//! 2. Tracing - exactly one server span, ended once, context propagated
//! 3. RequestLog - one "Incoming request", one "Request completed", at most one
//!    "Request error", exactly one metrics record

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use beacon_core::{AppError, TelemetryContext};
use beacon_middleware::{
    context::MiddlewareContext,
    pipeline::Pipeline,
    types::{HandlerResult, Request, Response, ResponseExt},
};
use beacon_telemetry::{RequestMeasurement, RequestRecorder};
use bytes::Bytes;
use http::StatusCode;
use opentelemetry::trace::{Status, TracerProvider as _};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

// ============================================================================
// Harness
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    message: String,
    fields: HashMap<String, String>,
}

/// A layer that records every event, with the fields of its enclosing spans.
#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    fn named(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.message == message)
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn at_error(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|e| e.level == Level::ERROR)
            .map(|e| e.message)
            .collect()
    }
}

struct SpanFields(HashMap<String, String>);

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            if let Some(fields) = span.extensions_mut().get_mut::<SpanFields>() {
                fields.0.extend(visitor.fields);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if event.metadata().target().starts_with("opentelemetry") {
            return;
        }

        let mut fields = HashMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.0.clone());
                }
            }
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        fields.extend(visitor.fields);
        let message = fields.remove("message").unwrap_or_default();

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

#[derive(Default)]
struct CountingRecorder {
    seen: Mutex<Vec<RequestMeasurement>>,
}

impl CountingRecorder {
    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_status(&self) -> Option<u16> {
        self.seen.lock().unwrap().last().map(|m| m.status_code)
    }
}

impl RequestRecorder for CountingRecorder {
    fn record(&self, measurement: &RequestMeasurement) {
        self.seen.lock().unwrap().push(measurement.clone());
    }
}

struct Harness {
    pipeline: Pipeline,
    logs: CaptureLayer,
    spans: InMemorySpanExporter,
    recorder: Arc<CountingRecorder>,
    _provider: TracerProvider,
}

impl Harness {
    fn traced() -> Self {
        Self::build(true)
    }

    fn untraced() -> Self {
        Self::build(false)
    }

    fn build(traced: bool) -> Self {
        beacon_telemetry::tracing::install_propagator();

        let spans = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let recorder = Arc::new(CountingRecorder::default());

        let mut builder = Pipeline::builder()
            .service_name("beacon-e2e")
            .recorder(recorder.clone());
        if traced {
            builder = builder.tracer(provider.tracer("beacon-e2e"));
        }

        Self {
            pipeline: builder.build(),
            logs: CaptureLayer::default(),
            spans,
            recorder,
            _provider: provider,
        }
    }

    fn subscriber(&self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(self.logs.clone())
    }

    fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }

    async fn send<H>(&self, route: Option<&str>, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> beacon_middleware::BoxFuture<'static, HandlerResult>
            + Send,
    {
        let mut ctx = MiddlewareContext::new(TelemetryContext::new()).with_client_ip("127.0.0.1");
        if let Some(route) = route {
            ctx = ctx.with_route(route);
        }
        self.pipeline.process(ctx, request, handler).await
    }
}

fn get(path: &str) -> Request {
    http::Request::builder()
        .method("GET")
        .uri(path)
        .header("user-agent", "e2e-test")
        .body(Bytes::new())
        .unwrap()
}

fn attr(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

async fn simulated_panic() -> HandlerResult {
    panic!("This is a simulated panic!")
}

async fn user_found() -> HandlerResult {
    Ok(Response::json(
        StatusCode::OK,
        &serde_json::json!({"id": 42, "name": "Ada", "email": "ada@example.com"}),
    ))
}

// ============================================================================
// Success
// ============================================================================

#[tokio::test]
async fn test_success_emits_one_of_each() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/users/:id"), get("/api/users/42"), |_ctx, _req| {
            Box::pin(user_found())
        })
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("traceparent"));

    assert_eq!(h.logs.named("Incoming request").len(), 1);
    assert_eq!(h.logs.named("Request completed").len(), 1);
    assert!(h.logs.named("Request error").is_empty());
    assert!(h.logs.named("Panic recovered").is_empty());
    assert_eq!(h.recorder.count(), 1);

    let spans = h.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "GET /api/users/:id");
    assert_eq!(attr(&spans[0], "http.status_code"), Some(Value::from(200_i64)));
}

/// Sends one traced request and checks every log entry it produced carries the
/// ids of its server span. Returns the messages in emission order.
async fn entries_carry_trace_identity<H>(path: &str, handler: H) -> Vec<String>
where
    H: FnOnce(&mut MiddlewareContext, Request) -> beacon_middleware::BoxFuture<'static, HandlerResult>
        + Send,
{
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    h.send(Some(path), get(path), handler).await;

    let spans = h.finished_spans();
    assert_eq!(spans.len(), 1);
    let trace_id = spans[0].span_context.trace_id().to_string();
    let span_id = spans[0].span_context.span_id().to_string();

    let entries = h.logs.all();
    for entry in &entries {
        assert_eq!(entry.fields.get("trace_id"), Some(&trace_id), "{}", entry.message);
        assert_eq!(entry.fields.get("span_id"), Some(&span_id), "{}", entry.message);
    }
    entries.into_iter().map(|e| e.message).collect()
}

#[tokio::test]
async fn test_logs_carry_trace_identity() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    h.send(Some("/"), get("/"), |_ctx, _req| {
        Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
    })
    .await;

    let spans = h.finished_spans();
    let incoming = &h.logs.named("Incoming request")[0];
    assert_eq!(
        incoming.fields["trace_id"],
        spans[0].span_context.trace_id().to_string()
    );
    assert_eq!(
        incoming.fields["span_id"],
        spans[0].span_context.span_id().to_string()
    );
    assert_eq!(incoming.fields["http.route"], "/");
    assert_eq!(incoming.fields["http.user_agent"], "e2e-test");
    assert_eq!(incoming.fields["http.client_ip"], "127.0.0.1");

    let completed = &h.logs.named("Request completed")[0];
    assert_eq!(completed.fields["http.status_code"], "200");
    assert!(completed.fields.contains_key("http.request.duration_ms"));
    assert_eq!(
        completed.fields["trace_id"],
        spans[0].span_context.trace_id().to_string()
    );
}

#[tokio::test]
async fn test_error_entries_carry_trace_identity() {
    let messages = entries_carry_trace_identity("/api/error", |_ctx, _req| {
        Box::pin(async {
            tracing::warn!("Simulated error endpoint called");
            Err(AppError::internal("This is a simulated error"))
        })
    })
    .await;

    assert_eq!(
        messages,
        [
            "Incoming request",
            "Simulated error endpoint called",
            "Request completed",
            "Request error",
        ]
    );
}

#[tokio::test]
async fn test_panic_entries_carry_trace_identity() {
    let messages =
        entries_carry_trace_identity("/api/panic", |_ctx, _req| Box::pin(simulated_panic())).await;

    assert_eq!(
        messages,
        ["Incoming request", "Request completed", "Panic recovered"]
    );
}

#[tokio::test]
async fn test_handler_sees_the_server_span() {
    let h = Harness::traced();

    h.send(Some("/api/users/:id"), get("/api/users/1"), |ctx, _req| {
        let telemetry = ctx.telemetry().clone();
        Box::pin(async move {
            assert!(telemetry.has_span());
            telemetry.set_attribute(opentelemetry::KeyValue::new("cache.hit", true));
            Ok(Response::empty(StatusCode::OK))
        })
    })
    .await;

    let spans = h.finished_spans();
    assert_eq!(attr(&spans[0], "cache.hit"), Some(Value::from(true)));
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_client_error_logs_warn() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/users/:id"), get("/api/users/999999"), |_ctx, _req| {
            Box::pin(async { Err(AppError::not_found("User not found")) })
        })
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.body().as_ref(), br#"{"error":"User not found"}"#);
    assert!(response.headers().contains_key("traceparent"));

    let errors = h.logs.named("Request error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, Level::WARN);
    assert_eq!(h.logs.named("Request completed").len(), 1);
    assert_eq!(h.recorder.last_status(), Some(404));

    let spans = h.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::error("User not found"));
}

#[tokio::test]
async fn test_server_error_logs_error() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/error"), get("/api/error"), |_ctx, _req| {
            Box::pin(async { Err(AppError::internal("This is a simulated error")) })
        })
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body().as_ref(),
        br#"{"error":"This is a simulated error"}"#
    );

    let errors = h.logs.named("Request error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, Level::ERROR);
    assert_eq!(h.recorder.count(), 1);
}

#[tokio::test]
async fn test_dependency_error_logs_cause_once() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/users"), get("/api/users"), |_ctx, _req| {
            Box::pin(async {
                Err(AppError::dependency(
                    "Failed to fetch users",
                    anyhow::anyhow!("pool timed out"),
                ))
            })
        })
        .await;

    assert_eq!(
        response.body().as_ref(),
        br#"{"error":"Failed to fetch users"}"#
    );
    assert_eq!(h.logs.at_error(), ["Request error"]);
    let error = &h.logs.named("Request error")[0];
    assert!(error.fields["error"].contains("pool timed out"));

    let spans = h.finished_spans();
    assert_eq!(spans[0].status, Status::error("Failed to fetch users"));
}

// ============================================================================
// Panics
// ============================================================================

#[tokio::test]
async fn test_panic_is_contained() {
    let h = Harness::traced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/panic"), get("/api/panic"), |_ctx, _req| {
            Box::pin(simulated_panic())
        })
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body().as_ref(),
        br#"{"error":"Internal Server Error"}"#
    );
    assert!(response.headers().contains_key("traceparent"));

    let recovered = h.logs.named("Panic recovered");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].level, Level::ERROR);
    assert_eq!(recovered[0].fields["method"], "GET");
    assert_eq!(recovered[0].fields["path"], "/api/panic");
    assert_eq!(recovered[0].fields["error"], "This is a simulated panic!");
    assert!(!recovered[0].fields["stack"].is_empty());

    assert_eq!(h.logs.named("Incoming request").len(), 1);
    assert_eq!(h.logs.named("Request completed").len(), 1);
    assert!(h.logs.named("Request error").is_empty());
    assert_eq!(h.logs.at_error(), ["Panic recovered"]);
    assert_eq!(h.recorder.count(), 1);
    assert_eq!(h.recorder.last_status(), Some(500));

    let spans = h.finished_spans();
    assert_eq!(spans.len(), 1);
    assert!(matches!(spans[0].status, Status::Error { .. }));
    assert_eq!(
        attr(&spans[0], "panic.error"),
        Some(Value::from("This is a simulated panic!"))
    );
}

#[tokio::test]
async fn test_requests_are_served_after_a_panic() {
    let h = Harness::traced();

    let first = h
        .send(Some("/debug/panic"), get("/debug/panic"), |_ctx, _req| {
            Box::pin(simulated_panic())
        })
        .await;
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let second = h
        .send(Some("/api/users/:id"), get("/api/users/42"), |_ctx, _req| {
            Box::pin(user_found())
        })
        .await;
    assert_eq!(second.status(), StatusCode::OK);

    assert_eq!(h.recorder.count(), 2);
    assert_eq!(h.finished_spans().len(), 2);
}

// ============================================================================
// Tracing disabled
// ============================================================================

#[tokio::test]
async fn test_untraced_pipeline_still_serves() {
    let h = Harness::untraced();
    let _guard = tracing::subscriber::set_default(h.subscriber());

    let response = h
        .send(Some("/api/users/:id"), get("/api/users/42"), |ctx, _req| {
            let telemetry = ctx.telemetry().clone();
            Box::pin(async move {
                assert!(!telemetry.has_span());
                telemetry.set_attribute(opentelemetry::KeyValue::new("cache.hit", false));
                user_found().await
            })
        })
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("traceparent"));
    assert!(h.finished_spans().is_empty());
    assert_eq!(h.recorder.count(), 1);
    assert!(!h.logs.named("Incoming request")[0]
        .fields
        .contains_key("trace_id"));
}

#[tokio::test]
async fn test_untraced_panic_is_contained() {
    let h = Harness::untraced();

    let response = h
        .send(None, get("/debug/panic"), |_ctx, _req| Box::pin(simulated_panic()))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.recorder.last_status(), Some(500));
}

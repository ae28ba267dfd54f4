//! Request logging and metrics middleware.
//!
//! This stage emits the structured request logs and records the HTTP metrics
//! for every request, exactly once, whatever the outcome.
//!
//! # Pipeline Position
//!
//! Innermost stage, directly around the handler:
//!
//! ```text
//! Recovery → Tracing → [RequestLog] → Handler
//! ```
//!
//! # Log Entries
//!
//! - `Incoming request` (info) - `http.method`, `http.route`, `http.path`,
//!   `http.user_agent`, `http.client_ip`
//! - `Request completed` (info) - `http.method`, `http.route`,
//!   `http.status_code`, `http.request.duration_ms`
//! - `Request error` - only on error; error level for server-side
//!   categories, warn for client errors. Faults are left to
//!   [`RecoveryStage`](super::RecoveryStage), whose `Panic recovered` entry is
//!   the single error entry of a panicking request.
//!
//! `trace_id` and `span_id` are not repeated here: every entry is emitted
//! inside the `request` span opened by the pipeline, which carries them.
//!
//! # Metrics
//!
//! One [`RequestMeasurement`] per request goes to the configured
//! [`RequestRecorder`]; in production that is
//! [`beacon_telemetry::HttpMetrics`].

use std::sync::Arc;
use std::time::Instant;

use beacon_telemetry::{RequestMeasurement, RequestRecorder};
use http::header::USER_AGENT;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{effective_status, response_size, HandlerResult, Request};

/// Request logging and metrics middleware.
#[derive(Clone)]
pub struct RequestLogStage {
    recorder: Arc<dyn RequestRecorder>,
}

impl RequestLogStage {
    /// Creates the stage around a metrics recorder.
    #[must_use]
    pub fn new(recorder: Arc<dyn RequestRecorder>) -> Self {
        Self { recorder }
    }
}

impl std::fmt::Debug for RequestLogStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogStage").finish_non_exhaustive()
    }
}

impl Middleware for RequestLogStage {
    fn name(&self) -> &'static str {
        "request_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let start = Instant::now();

            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let route = ctx.route_or(&path).to_string();
            let request_size = request.body().len() as u64;
            let user_agent = request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            tracing::info!(
                http.method = %method,
                http.route = %route,
                http.path = %path,
                http.user_agent = %user_agent,
                http.client_ip = %ctx.client_ip().unwrap_or_default(),
                "Incoming request"
            );

            let result = next.run(ctx, request).await;

            let duration = start.elapsed();
            let status = effective_status(&result);
            let duration_ms = duration.as_secs_f64() * 1000.0;

            self.recorder.record(&RequestMeasurement {
                method: method.clone(),
                route: route.clone(),
                status_code: status.as_u16(),
                duration,
                request_size,
                response_size: response_size(&result),
            });

            tracing::info!(
                http.method = %method,
                http.route = %route,
                http.status_code = status.as_u16(),
                http.request.duration_ms = duration_ms,
                "Request completed"
            );

            if let Err(err) = &result {
                if err.is_fault() {
                    // logged by recovery, with the stack
                } else if err.category().is_server_side() {
                    tracing::error!(
                        http.method = %method,
                        http.route = %route,
                        http.status_code = status.as_u16(),
                        error = %err,
                        "Request error"
                    );
                } else {
                    tracing::warn!(
                        http.method = %method,
                        http.route = %route,
                        http.status_code = status.as_u16(),
                        error = %err,
                        "Request error"
                    );
                }
            }

            result
        })
    }
}

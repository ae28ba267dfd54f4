//! Fixed-order middleware pipeline.
//!
//! This module implements the immutable pipeline every request flows through.
//! The stage order is fixed by [`PipelineBuilder::build`] and cannot be changed
//! by applications.
//!
//! ## Pipeline Stages
//!
//! 1. **Recovery** - Contain panics; render faults as `500`
//! 2. **Tracing** - Open the server span (omitted when tracing is disabled)
//! 3. **Request Log** - Emit request logs and HTTP metrics
//!
//! The pipeline itself is the outermost error handler: an error that leaves
//! the chain is rendered as `{"error": "<message>"}` with the error's status
//! code, together with any headers the stages deferred.
//!
//! Every request runs inside a `request` log span. The tracing stage records
//! `trace_id` and `span_id` on it, so each log entry of the request carries
//! them without naming them.

use std::sync::Arc;

use beacon_telemetry::{NoopRecorder, RequestRecorder};
use opentelemetry_sdk::trace::Tracer;
use tracing::Instrument as _;

use crate::context::MiddlewareContext;
use crate::fault;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{RecoveryStage, RequestLogStage, TracingStage};
use crate::types::{HandlerResult, Request, Response, ResponseExt};

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The fixed-order middleware pipeline.
///
/// # Example
///
/// ```ignore
/// use beacon_middleware::pipeline::Pipeline;
///
/// let pipeline = Pipeline::builder()
///     .service_name("beacon")
///     .tracer(tracer)
///     .recorder(Arc::new(http_metrics))
///     .build();
///
/// let response = pipeline.process(ctx, request, handler).await;
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through the entire pipeline.
    ///
    /// This is the main entry point for request processing. It always yields a
    /// response: errors that leave the chain are rendered here.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send,
    {
        let next = self.build_chain(handler);

        // error level keeps the ids on error entries under any filter
        let span = tracing::error_span!(
            "request",
            trace_id = tracing::field::Empty,
            span_id = tracing::field::Empty,
        );
        let result = next.run(&mut ctx, request).instrument(span).await;

        match result {
            Ok(response) => response,
            Err(err) => {
                let mut response = Response::from_error(&err);
                ctx.apply_deferred_headers(&mut response);
                response
            }
        }
    }

    /// Builds the middleware chain for a request.
    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a,
    {
        let mut next = Next::handler(handler);

        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }

        next
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
///
/// The builder supplies what the stages need; it does not choose their order.
pub struct PipelineBuilder {
    service_name: String,
    tracer: Option<Tracer>,
    recorder: Arc<dyn RequestRecorder>,
}

impl PipelineBuilder {
    /// Creates a builder with no tracer and a no-op recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            service_name: "beacon".to_string(),
            tracer: None,
            recorder: Arc::new(NoopRecorder),
        }
    }

    /// Sets the service name recorded on server spans.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Enables the tracing stage with `tracer`.
    ///
    /// Without a tracer the tracing stage is left out.
    #[must_use]
    pub fn tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Sets the HTTP metrics recorder.
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn RequestRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Builds the pipeline and installs the panic hook.
    #[must_use]
    pub fn build(self) -> Pipeline {
        fault::install_panic_hook();

        let mut stages: Vec<BoxedMiddleware> = vec![Arc::new(RecoveryStage::new())];
        if let Some(tracer) = self.tracer {
            stages.push(Arc::new(TracingStage::new(self.service_name, tracer)));
        }
        stages.push(Arc::new(RequestLogStage::new(self.recorder)));

        Pipeline { stages }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware stage marker for the fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: Panic containment
    Recovery = 1,
    /// Stage 2: Server span
    Tracing = 2,
    /// Stage 3: Request logs and metrics
    RequestLog = 3,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Tracing => "tracing",
            Self::RequestLog => "request_log",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 3] {
        [Self::Recovery, Self::Tracing, Self::RequestLog]
    }
}

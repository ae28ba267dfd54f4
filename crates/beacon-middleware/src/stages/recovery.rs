//! Recovery middleware.
//!
//! The outermost stage. It turns a fault outcome into a normal
//! `500 {"error":"Internal Server Error"}` response so that a panic never
//! reaches the transport.
//!
//! Faults arrive two ways: as [`AppError::Fault`] from the handler boundary
//! (see [`Next::run`]), or as an unwind out of an inner stage, which this stage
//! catches itself. Either way its `Panic recovered` entry is the only
//! error-level log of the request.

use beacon_core::{AppError, ErrorBody, FAULT_MESSAGE};
use http::StatusCode;

use crate::context::MiddlewareContext;
use crate::fault;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{HandlerResult, Request, Response, ResponseExt};

/// Middleware that contains panics.
///
/// Non-fault outcomes pass through unchanged. Faults are logged once at error
/// level and never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStage;

impl RecoveryStage {
    /// Creates the recovery stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RecoveryStage {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();

            let outcome = fault::catch_panic(next.run(ctx, request)).await;
            let result = match outcome {
                Ok(result) => result,
                Err(caught) => Err(caught.into_fault(ctx.telemetry())),
            };

            match result {
                Err(AppError::Fault { message, stack }) => {
                    tracing::error!(
                        method = %method,
                        path = %path,
                        error = %message,
                        stack = %stack,
                        "Panic recovered"
                    );

                    let body = ErrorBody {
                        error: FAULT_MESSAGE.to_string(),
                    };
                    let mut response = Response::json(StatusCode::INTERNAL_SERVER_ERROR, &body);
                    ctx.apply_deferred_headers(&mut response);
                    Ok(response)
                }
                other => other,
            }
        })
    }
}

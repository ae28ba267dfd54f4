//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every pipeline stage
//! implements. A stage receives the mutable context, the request, and a
//! [`Next`] callback; it returns the outcome of the rest of the chain, possibly
//! transformed.
//!
//! Beacon uses one fixed stage sequence. Stages are not reordered, disabled or
//! inserted by applications; see [`crate::pipeline`].
//!
//! # Example
//!
//! ```ignore
//! use beacon_middleware::{BoxFuture, HandlerResult, Middleware, Next, Request};
//! use beacon_middleware::context::MiddlewareContext;
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let result = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?start.elapsed(), "chain finished");
//!             result
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

use crate::context::MiddlewareContext;
use crate::fault;
use crate::types::{HandlerResult, Request};

/// A boxed future that returns `T`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The terminal request handler invoked at the end of the chain.
pub type HandlerFn<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult> + Send + 'a>;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage does not swallow downstream errors unless it is the stage that
///   owns turning them into responses
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    fn name(&self) -> &'static str;

    /// Processes the request through this stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The mutable middleware context
    /// * `request` - The incoming HTTP request
    /// * `next` - Callback to invoke the rest of the chain
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Callback to invoke the rest of the middleware chain.
///
/// Consumed by [`run`](Self::run), so it can only be called once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More stages to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain - invoke the handler
    Handler(HandlerFn<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, HandlerResult>
            + Send
            + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or the handler.
    ///
    /// The handler call is the fault boundary: a panic raised while creating or
    /// polling the handler future comes back as [`beacon_core::AppError::Fault`]
    /// and the active span is marked failed.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> HandlerResult {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => {
                let outcome = match fault::catch_panic_sync(|| handler(ctx, request)) {
                    Ok(future) => fault::catch_panic(future).await,
                    Err(caught) => Err(caught),
                };

                match outcome {
                    Ok(result) => result,
                    Err(caught) => Err(caught.into_fault(ctx.telemetry())),
                }
            }
        }
    }
}

//! Route handlers.
//!
//! A handler is an async function of the request's [`TelemetryContext`] and the
//! buffered request. Handlers are type-erased into a [`BoxHandler`] when they
//! are added to the [`Router`](crate::Router).
//!
//! # Example
//!
//! ```rust
//! use beacon_core::TelemetryContext;
//! use beacon_middleware::{HandlerResult, Request, Response, ResponseExt};
//! use beacon_server::handler;
//! use http::StatusCode;
//!
//! async fn favicon(_ctx: TelemetryContext, _req: Request) -> HandlerResult {
//!     Ok(Response::empty(StatusCode::NO_CONTENT))
//! }
//!
//! let boxed = handler(favicon);
//! # let _ = boxed;
//! ```

use std::future::Future;
use std::sync::Arc;

use beacon_core::{AppError, AppResult, TelemetryContext};
use beacon_middleware::{BoxFuture, HandlerResult, Request};
use serde::de::DeserializeOwned;

/// A type-erased handler.
pub type BoxHandler = Arc<dyn Fn(TelemetryContext, Request) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Erases an async handler function.
pub fn handler<F, Fut>(func: F) -> BoxHandler
where
    F: Fn(TelemetryContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(func(ctx, request)))
}

/// Decodes the request body as JSON.
///
/// Any decoding failure is a 400 `Invalid request body`.
pub fn json_body<T: DeserializeOwned>(request: &Request) -> AppResult<T> {
    serde_json::from_slice(request.body()).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        AppError::bad_request("Invalid request body")
    })
}

/// Returns the value of query parameter `name`, if present.
///
/// Values are taken verbatim; no percent-decoding is applied.
pub fn query_param<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.uri().query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

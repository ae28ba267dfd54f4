//! Route handlers.
//!
//! Handlers receive the per-request [`TelemetryContext`](beacon_core::TelemetryContext)
//! and the buffered request, and return `Result<Response, AppError>`. Errors
//! are rendered by the pipeline as `{"error": "<message>"}`.

pub mod system;
pub mod users;

use beacon_core::{AppError, AppResult};
use beacon_middleware::Request;
use beacon_server::PathParams;
use serde::Serialize;

/// `{"message": ...}` body.
#[derive(Debug, Serialize)]
struct Message {
    message: &'static str,
}

/// Parses the `:id` path parameter.
///
/// An id that is not a number cannot name a row, so it is reported as missing.
fn user_id(request: &Request) -> AppResult<i32> {
    request
        .extensions()
        .get::<PathParams>()
        .and_then(|params| params.get("id"))
        .and_then(|raw| raw.parse::<i32>().ok())
        .ok_or_else(|| AppError::not_found("User not found"))
}

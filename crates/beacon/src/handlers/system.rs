//! Service-level routes: root, favicon, health and the failure drills.

use std::sync::Arc;

use beacon_core::{AppError, TelemetryContext};
use beacon_middleware::{HandlerResult, Request, Response, ResponseExt};
use beacon_server::{DependencyStatus, HealthReport};
use http::StatusCode;
use serde::Serialize;

use crate::state::ApiState;

#[derive(Debug, Serialize)]
struct Greeting<'a> {
    message: &'static str,
    service: &'a str,
    version: &'a str,
}

/// `GET /`
pub async fn root(state: Arc<ApiState>, _telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    Ok(Response::json(
        StatusCode::OK,
        &Greeting {
            message: "Hello, World!",
            service: &state.service_name,
            version: &state.service_version,
        },
    ))
}

/// `GET /favicon.ico`
pub async fn favicon(_telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    Ok(Response::empty(StatusCode::NO_CONTENT))
}

/// `GET /health`
///
/// Pings the store and the cache concurrently.
pub async fn health(state: Arc<ApiState>, _telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    let (database, redis) = tokio::join!(state.store.ping(), state.cache.ping());

    if let Err(e) = &database {
        tracing::warn!(error = %e, "Database health check failed");
    }
    if let Err(e) = &redis {
        tracing::warn!(error = %e, "Redis health check failed");
    }

    let report = HealthReport::new()
        .with("database", DependencyStatus::from_probe(&database))
        .with("redis", DependencyStatus::from_probe(&redis));

    Ok(Response::json(report.status_code(), &report))
}

/// `GET /api/error`
pub async fn simulated_error(_telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    tracing::warn!("Simulated error endpoint called");
    Err(AppError::internal("This is a simulated error"))
}

/// `GET /api/panic`
pub async fn simulated_panic(_telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    panic!("This is a simulated panic!");
}

/// `GET /debug/error`
pub async fn debug_error(_telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    Err(AppError::bad_request("This is a deliberate error"))
}

/// `GET /debug/panic`
pub async fn debug_panic(_telemetry: TelemetryContext, _request: Request) -> HandlerResult {
    panic!("THIS IS A TEST PANIC");
}

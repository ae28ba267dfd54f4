//! The route table.

use std::future::Future;
use std::sync::Arc;

use beacon_core::TelemetryContext;
use beacon_middleware::{HandlerResult, Request};
use beacon_server::{handler, BoxHandler, Router};

use crate::handlers::{system, users};
use crate::state::ApiState;

/// Builds the service router.
///
/// | Method | Path | Handler |
/// |--------|------|---------|
/// | GET | `/` | service greeting |
/// | GET | `/favicon.ico` | `204` |
/// | GET | `/health` | dependency health |
/// | GET, POST | `/api/users` | list, create |
/// | GET, DELETE | `/api/users/:id` | cache-aside read, delete |
/// | GET | `/api/error`, `/api/panic` | failure drills |
/// | GET | `/debug/error`, `/debug/panic` | failure drills |
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .get("/", with_state(&state, system::root))
        .get("/favicon.ico", handler(system::favicon))
        .get("/health", with_state(&state, system::health))
        .get("/api/users", with_state(&state, users::list_users))
        .post("/api/users", with_state(&state, users::create_user))
        .get("/api/users/:id", with_state(&state, users::get_user))
        .delete("/api/users/:id", with_state(&state, users::delete_user))
        .get("/api/error", handler(system::simulated_error))
        .get("/api/panic", handler(system::simulated_panic))
        .get("/debug/error", handler(system::debug_error))
        .get("/debug/panic", handler(system::debug_panic))
}

/// Erases a handler that also takes the shared state.
fn with_state<F, Fut>(state: &Arc<ApiState>, func: F) -> BoxHandler
where
    F: Fn(Arc<ApiState>, TelemetryContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let state = Arc::clone(state);
    handler(move |telemetry, request| func(Arc::clone(&state), telemetry, request))
}

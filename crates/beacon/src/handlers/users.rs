//! `users` CRUD handlers.
//!
//! Store calls run inside `db.*` child spans; reads go through the
//! cache-aside [`UserReader`](beacon_storage::UserReader).

use std::sync::Arc;

use beacon_core::{AppError, NewUser, Pagination, TelemetryContext, User};
use beacon_middleware::{HandlerResult, Request, Response, ResponseExt};
use beacon_server::{json_body, query_param};
use http::StatusCode;
use opentelemetry::KeyValue;
use serde::Serialize;

use super::{user_id, Message};
use crate::state::ApiState;

#[derive(Debug, Serialize)]
struct UserList {
    users: Vec<User>,
    metadata: ListMetadata,
}

#[derive(Debug, Serialize)]
struct ListMetadata {
    count: usize,
    limit: i64,
    page: i64,
}

#[derive(Debug, Serialize)]
struct UserCreated {
    message: &'static str,
    user: User,
}

/// `GET /api/users?limit&page`
pub async fn list_users(
    state: Arc<ApiState>,
    telemetry: TelemetryContext,
    request: Request,
) -> HandlerResult {
    let page = Pagination::from_query(
        query_param(&request, "limit"),
        query_param(&request, "page"),
    );
    let span = telemetry.child("db.list-users");
    span.set_attributes([
        KeyValue::new("pagination.limit", page.limit),
        KeyValue::new("pagination.page", page.page),
    ]);
    let result = state.store.list_users(page.limit, page.offset()).await;
    span.end();

    let users = result.map_err(|e| {
        tracing::warn!(error = %e, "Failed to query users");
        AppError::dependency("Failed to fetch users", e)
    })?;

    tracing::info!(
        count = users.len(),
        limit = page.limit,
        page = page.page,
        "Users fetched with pagination"
    );

    let metadata = ListMetadata {
        count: users.len(),
        limit: page.limit,
        page: page.page,
    };
    Ok(Response::json(StatusCode::OK, &UserList { users, metadata }))
}

/// `POST /api/users`
pub async fn create_user(
    state: Arc<ApiState>,
    telemetry: TelemetryContext,
    request: Request,
) -> HandlerResult {
    let new_user: NewUser = json_body(&request)?;
    new_user.validate()?;

    let span = telemetry.child("db.create-user");
    let result = state.store.create_user(&new_user).await;
    if let Ok(user) = &result {
        span.set_attribute(KeyValue::new("user.id", i64::from(user.id)));
    }
    span.end();

    let user = result.map_err(|e| {
        if e.is_unique_violation() {
            tracing::warn!(email = %new_user.email, "Duplicate user email");
            return AppError::conflict("User with this email already exists");
        }
        tracing::warn!(error = %e, "Failed to create user");
        AppError::dependency("Failed to create user", e)
    })?;

    tracing::info!(user.id = user.id, email = %user.email, "User created");

    Ok(Response::json(
        StatusCode::CREATED,
        &UserCreated {
            message: "User created",
            user,
        },
    ))
}

/// `GET /api/users/:id`
pub async fn get_user(
    state: Arc<ApiState>,
    telemetry: TelemetryContext,
    request: Request,
) -> HandlerResult {
    let id = user_id(&request)?;
    let user = state.reader.get_user(&telemetry, id).await?;
    Ok(Response::json(StatusCode::OK, &user))
}

/// `DELETE /api/users/:id`
pub async fn delete_user(
    state: Arc<ApiState>,
    telemetry: TelemetryContext,
    request: Request,
) -> HandlerResult {
    let id = user_id(&request)?;

    let span = telemetry.child("db.delete-user");
    span.set_attribute(KeyValue::new("user.id", i64::from(id)));
    let result = state.store.delete_user(id).await;
    span.end();

    let deleted = result.map_err(|e| {
        tracing::warn!(user.id = id, error = %e, "Failed to delete user");
        AppError::dependency("Failed to delete user", e)
    })?;
    if !deleted {
        return Err(AppError::not_found("User not found"));
    }

    state.reader.invalidate(id).await;
    tracing::info!(user.id = id, "User deleted");

    Ok(Response::json(
        StatusCode::OK,
        &Message {
            message: "User deleted",
        },
    ))
}

//! Common types used throughout the middleware pipeline.
//!
//! Bodies are fully buffered: the server collects the request body before the
//! pipeline runs, and handlers produce complete response bodies.

use beacon_core::AppError;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;

/// The HTTP request type used in the middleware pipeline.
pub type Request = http::Request<Bytes>;

/// The HTTP response type used in the middleware pipeline.
pub type Response = http::Response<Bytes>;

/// The outcome of a stage or handler.
pub type HandlerResult = Result<Response, AppError>;

const FALLBACK_ERROR_BODY: &[u8] = br#"{"error":"Internal Server Error"}"#;

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates a JSON response from a serializable value.
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response;

    /// Creates a response with no body.
    fn empty(status: StatusCode) -> Response;

    /// Creates the `{"error": ...}` response for an error.
    fn from_error(error: &AppError) -> Response;
}

impl ResponseExt for Response {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => build_json(status, Bytes::from(body)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                build_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(FALLBACK_ERROR_BODY),
                )
            }
        }
    }

    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = status;
        response
    }

    fn from_error(error: &AppError) -> Response {
        let body = serde_json::to_vec(&error.to_body())
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(FALLBACK_ERROR_BODY));
        build_json(error.status_code(), body)
    }
}

fn build_json(status: StatusCode, body: Bytes) -> Response {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Returns the status a request ended with.
///
/// A response carries its own status; an error maps to its declared status,
/// or 500 when it declares none.
#[must_use]
pub fn effective_status(result: &HandlerResult) -> StatusCode {
    match result {
        Ok(response) => response.status(),
        Err(error) => error.status_code(),
    }
}

/// Returns the size of the body the client receives for `result`.
#[must_use]
pub fn response_size(result: &HandlerResult) -> u64 {
    match result {
        Ok(response) => response.body().len() as u64,
        Err(error) => Response::from_error(error).body().len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let response = Response::from_error(&AppError::bad_request("Invalid request body"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            response.body().as_ref(),
            br#"{"error":"Invalid request body"}"#
        );
    }

    #[test]
    fn test_fault_response_hides_panic_message() {
        let response = Response::from_error(&AppError::fault("boom", "stack"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), FALLBACK_ERROR_BODY);
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(
            StatusCode::CREATED,
            &serde_json::json!({"message": "User created"}),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.body().as_ref(), br#"{"message":"User created"}"#);
    }

    #[test]
    fn test_empty_response() {
        let response = Response::empty(StatusCode::NO_CONTENT);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_effective_status() {
        let ok: HandlerResult = Ok(Response::empty(StatusCode::ACCEPTED));
        assert_eq!(effective_status(&ok), StatusCode::ACCEPTED);

        let declared: HandlerResult = Err(AppError::not_found("User not found"));
        assert_eq!(effective_status(&declared), StatusCode::NOT_FOUND);

        let undeclared: HandlerResult = Err(AppError::dependency(
            "Failed to fetch users",
            anyhow::anyhow!("connection refused"),
        ));
        assert_eq!(effective_status(&undeclared), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_response_size_of_error() {
        let result: HandlerResult = Err(AppError::not_found("User not found"));
        assert_eq!(
            response_size(&result),
            br#"{"error":"User not found"}"#.len() as u64
        );
    }
}

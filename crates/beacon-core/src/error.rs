//! Error types for Beacon.
//!
//! [`AppError`] is the error every handler and stage returns. Each variant
//! belongs to an [`ErrorCategory`] which decides the HTTP status code and
//! whether the message is safe to show to clients.
//!
//! | `ErrorCategory` | Status | Client sees |
//! |---|---|---|
//! | `Client` | declared (4xx) | the message |
//! | `Server` | declared (5xx) | the message |
//! | `Dependency` | 500 | the generic message, never the cause |
//! | `Fault` | 500 | `Internal Server Error` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`AppError`].
pub type AppResult<T> = Result<T, AppError>;

/// Message returned to clients when a handler panics.
pub const FAULT_MESSAGE: &str = "Internal Server Error";

/// Categories of errors for classification and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller mistakes (missing fields, malformed body, unknown resource).
    Client,
    /// Errors raised deliberately by the service with a 5xx code.
    Server,
    /// Store or cache unreachable, or a query failed.
    Dependency,
    /// An unrecovered fault (panic) contained by the pipeline.
    Fault,
}

impl ErrorCategory {
    /// Returns true if errors of this category should be logged at error level.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

/// Standard error type for Beacon.
///
/// # Example
///
/// ```
/// use beacon_core::AppError;
/// use http::StatusCode;
///
/// let err = AppError::not_found("User not found");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert_eq!(err.public_message(), "User not found");
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// An error carrying an explicit HTTP status.
    #[error("{message}")]
    Status {
        /// The declared HTTP status.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
    },

    /// A dependency (store, cache) failed.
    ///
    /// The cause is kept for logs and never rendered to clients.
    #[error("{message}: {source}")]
    Dependency {
        /// Generic message safe for clients.
        message: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// A panic converted into an error at the handler boundary.
    #[error("panic: {message}")]
    Fault {
        /// The panic payload rendered as text.
        message: String,
        /// The captured stack of the panic site.
        stack: String,
    },
}

impl AppError {
    /// Creates an error with an explicit status code.
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    /// Creates a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, message)
    }

    /// Creates a 500 error with a message that is shown to the client.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Creates a dependency error with a generic message and a hidden cause.
    pub fn dependency(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Dependency {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a fault error from a panic message and stack.
    #[must_use]
    pub fn fault(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            stack: stack.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Status { status, .. } if status.is_client_error() => ErrorCategory::Client,
            Self::Status { .. } => ErrorCategory::Server,
            Self::Dependency { .. } => ErrorCategory::Dependency,
            Self::Fault { .. } => ErrorCategory::Fault,
        }
    }

    /// Returns the HTTP status this error declares, if any.
    #[must_use]
    pub const fn declared_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Dependency { .. } | Self::Fault { .. } => None,
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// Errors that declare no status map to 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.declared_status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the message rendered to clients.
    #[must_use]
    pub fn public_message(&self) -> &str {
        match self {
            Self::Status { message, .. } | Self::Dependency { message, .. } => message,
            Self::Fault { .. } => FAULT_MESSAGE,
        }
    }

    /// Returns true if this error is a contained panic.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    /// Converts this error to the JSON body sent to clients.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.public_message().to_string(),
        }
    }
}

/// JSON error body: `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The client-facing message.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request() {
        let error = AppError::bad_request("name and email are required");
        assert_eq!(error.category(), ErrorCategory::Client);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.to_string(), "name and email are required");
    }

    #[test]
    fn test_declared_server_status() {
        let error = AppError::internal("This is a simulated error");
        assert_eq!(error.category(), ErrorCategory::Server);
        assert_eq!(error.declared_status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(error.public_message(), "This is a simulated error");
    }

    #[test]
    fn test_dependency_hides_cause() {
        let error = AppError::dependency(
            "Failed to fetch users",
            anyhow::anyhow!("connection refused"),
        );
        assert_eq!(error.declared_status(), None);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "Failed to fetch users");
        assert!(error.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_fault_renders_generic_body() {
        let error = AppError::fault("boom", "at handler.rs:10");
        assert!(error.is_fault());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = serde_json::to_string(&error.to_body()).expect("serialization should work");
        assert_eq!(json, r#"{"error":"Internal Server Error"}"#);
    }

    #[test]
    fn test_client_errors_are_not_server_side() {
        assert!(!ErrorCategory::Client.is_server_side());
        assert!(ErrorCategory::Server.is_server_side());
        assert!(ErrorCategory::Dependency.is_server_side());
        assert!(ErrorCategory::Fault.is_server_side());
    }
}

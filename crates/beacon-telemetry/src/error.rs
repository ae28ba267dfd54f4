//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Failed to parse address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A provider failed to flush or shut down.
    #[error("Failed to shut down {provider}: {reason}")]
    Shutdown {
        /// Which provider failed.
        provider: &'static str,
        /// The provider's error.
        reason: String,
    },

    /// A provider did not finish shutting down in time.
    #[error("Timed out shutting down {0}")]
    ShutdownTimeout(&'static str),
}

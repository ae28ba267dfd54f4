//! Server and lifecycle error types.

use std::fmt::Write as _;
use std::net::SocketAddr;

use thiserror::Error;

/// Boxed error returned by lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while serving HTTP.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind address could not be parsed.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    /// The listener could not be bound.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: SocketAddr,
        /// The socket error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure of the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A shutdown step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Name of the step.
    pub step: String,
    /// What went wrong.
    pub reason: String,
}

/// Errors raised by the [`Lifecycle`](crate::Lifecycle) orchestrator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A startup step failed; startup was aborted.
    #[error("startup step '{step}' failed: {source}")]
    StartupFailed {
        /// Name of the failing step.
        step: String,
        /// The step's error.
        #[source]
        source: BoxError,
    },

    /// One or more shutdown steps failed or timed out. Every step was attempted.
    #[error("shutdown incomplete: {}", summarize(.failures))]
    ShutdownFailed {
        /// The failing steps, in teardown order.
        failures: Vec<StepFailure>,
    },
}

impl LifecycleError {
    /// Returns the name of the failing startup step, if this is a startup failure.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StartupFailed { step, .. } => Some(step),
            Self::ShutdownFailed { .. } => None,
        }
    }
}

fn summarize(failures: &[StepFailure]) -> String {
    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {}", failure.step, failure.reason);
    }
    out
}

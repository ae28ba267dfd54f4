//! Core middleware stages.
//!
//! The three stages of the request pipeline, outermost first:
//!
//! 1. [`recovery`] - Contain panics, render faults as 500
//! 2. [`tracing`] - Open the server span, propagate trace context
//! 3. [`request_log`] - Emit request logs and HTTP metrics

pub mod recovery;
pub mod request_log;
pub mod tracing;

// Re-export main types
pub use recovery::RecoveryStage;
pub use request_log::RequestLogStage;
pub use tracing::TracingStage;

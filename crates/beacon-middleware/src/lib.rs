//! # Beacon Middleware
//!
//! The request instrumentation pipeline for Beacon.
//!
//! Every request passes through the same fixed chain of cross-cutting stages
//! before it reaches its handler:
//!
//! ```text
//! Request → Recovery → Tracing → RequestLog → Handler
//!                                                ↓
//! Response ← Recovery ← Tracing ← RequestLog ←───┘
//! ```
//!
//! | Stage | Middleware    | Purpose                                      |
//! |-------|---------------|----------------------------------------------|
//! | 1     | Recovery      | Contain panics, render faults as 500         |
//! | 2     | Tracing       | Server span, W3C trace-context propagation   |
//! | 3     | RequestLog    | Request logs and HTTP metrics, once each     |
//!
//! Stages return `Result<Response, AppError>`. The handler boundary converts
//! panics into [`beacon_core::AppError::Fault`], and the pipeline renders any
//! error that leaves the chain as `{"error": "<message>"}`.
//!
//! ## Example
//!
//! ```
//! use beacon_middleware::pipeline::{Pipeline, Stage};
//!
//! // Stage order is fixed
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 3);
//! assert_eq!(stages[0].name(), "recovery");
//!
//! // Without a tracer the tracing stage is omitted
//! let pipeline = Pipeline::builder().build();
//! assert_eq!(pipeline.stage_names(), vec!["recovery", "request_log"]);
//! ```

#![doc(html_root_url = "https://docs.rs/beacon-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod fault;
pub mod middleware;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, HandlerFn, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{effective_status, HandlerResult, Request, Response, ResponseExt};

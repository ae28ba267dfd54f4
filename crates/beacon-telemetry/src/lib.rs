//! OpenTelemetry-based observability for Beacon.
//!
//! This crate owns the three telemetry providers and their shared wiring:
//!
//! - **Logging**: structured JSON logs on stdout, bridged to OTLP
//! - **Tracing**: OTLP span export, W3C trace-context + baggage propagation
//! - **Metrics**: OTLP metric export, HTTP instruments, runtime gauges, and an
//!   optional Prometheus scrape listener
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      beacon-telemetry                     │
//! │                                                           │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │   Logging   │   │   Tracing    │   │   Metrics    │   │
//! │  │ (fmt + OTLP)│   │ (batch OTLP) │   │(periodic OTLP)│  │
//! │  └──────┬──────┘   └──────┬───────┘   └──────┬───────┘   │
//! └─────────┼─────────────────┼──────────────────┼───────────┘
//!           │                 │                  │
//!           ▼                 ▼                  ▼
//!     ┌──────────┐      ┌──────────┐       ┌──────────┐
//!     │ stdout + │      │   OTLP   │       │  OTLP +  │
//!     │   OTLP   │      │ Collector│       │Prometheus│
//!     └──────────┘      └──────────┘       └──────────┘
//! ```
//!
//! Providers are initialized and shut down individually so the service
//! lifecycle can order them: logs first up and last down.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod tracing;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::init_logging;
pub use metrics::{
    init_metrics, install_prometheus, register_runtime_metrics, HttpMetrics, NoopRecorder,
    RequestMeasurement, RequestRecorder, RuntimeMetrics,
};
pub use shutdown::{shutdown_logger_provider, shutdown_meter_provider, shutdown_tracer_provider};
pub use tracing::{extract_context, init_tracing, inject_context, HeaderExtractor, HeaderInjector};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

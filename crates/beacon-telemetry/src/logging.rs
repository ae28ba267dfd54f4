//! Structured logging for Beacon.
//!
//! Logs are written as JSON (or pretty text in development) to stdout through
//! `tracing-subscriber`, and optionally bridged into an OpenTelemetry log
//! provider that exports them over OTLP.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_telemetry::{init_logging, TelemetryConfig};
//!
//! let provider = init_logging(&TelemetryConfig::default())?;
//!
//! tracing::info!(http.method = "GET", http.route = "/api/users", "Incoming request");
//! ```

use beacon_config::LogFormat;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::{BatchConfigBuilder, BatchLogProcessor, LoggerProvider};
use opentelemetry_sdk::runtime;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Targets whose events are never bridged to OTLP.
///
/// The exporter's own transport logs would otherwise feed back into it.
const EXPORTER_TARGETS: &[&str] = &[
    "h2",
    "hyper",
    "hyper_util",
    "tonic",
    "tower",
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
];

/// Initializes the logging subsystem and installs the global subscriber.
///
/// The filter comes from `RUST_LOG` when set, else from the configured level.
/// JSON records include the fields of the current span, which is where the
/// request pipeline keeps `trace_id` and `span_id`.
/// Returns the OTLP log provider when log export is enabled.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid, the exporter
/// cannot be built, or a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> TelemetryResult<Option<LoggerProvider>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => create_env_filter(&config.logging.level)?,
    };

    let fmt_layer = match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .boxed(),
    };

    let provider = if config.logging.otlp_enabled {
        Some(build_log_provider(config)?)
    } else {
        None
    };

    let otel_layer = provider.as_ref().map(|provider| {
        OpenTelemetryTracingBridge::new(provider).with_filter(filter_fn(|metadata| {
            !is_exporter_target(metadata.target())
        }))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        level = %config.logging.level,
        otlp = config.logging.otlp_enabled,
        "Logger initialized"
    );

    Ok(provider)
}

fn build_log_provider(config: &TelemetryConfig) -> TelemetryResult<LoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp.endpoint_url())
        .with_timeout(config.otlp.batch_export_timeout)
        .build()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let batch = BatchConfigBuilder::default()
        .with_scheduled_delay(config.otlp.batch_timeout)
        .with_max_queue_size(config.otlp.batch_max_queue_size)
        .with_max_export_timeout(config.otlp.batch_export_timeout)
        .build();

    let processor = BatchLogProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch)
        .build();

    Ok(LoggerProvider::builder()
        .with_log_processor(processor)
        .with_resource(config.resource())
        .build())
}

fn is_exporter_target(target: &str) -> bool {
    let root = target.split("::").next().unwrap_or(target);
    EXPORTER_TARGETS.contains(&root)
}

/// Creates an env filter from a string.
///
/// # Arguments
///
/// * `filter` - Filter string (e.g., "info", "beacon=debug,sqlx=warn")
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// Standard log fields for Beacon.
///
/// Use these field names for consistency across logs.
pub mod fields {
    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// Span ID field name.
    pub const SPAN_ID: &str = "span_id";

    /// HTTP method field name.
    pub const HTTP_METHOD: &str = "http.method";

    /// HTTP route pattern field name.
    pub const HTTP_ROUTE: &str = "http.route";

    /// HTTP path field name.
    pub const HTTP_PATH: &str = "http.path";

    /// HTTP status code field name.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Request duration field name (in milliseconds).
    pub const DURATION_MS: &str = "http.request.duration_ms";

    /// Client IP field name.
    pub const CLIENT_IP: &str = "http.client_ip";

    /// User agent field name.
    pub const USER_AGENT: &str = "http.user_agent";

    /// Error field name.
    pub const ERROR: &str = "error";

    /// User ID field name.
    pub const USER_ID: &str = "user.id";
}

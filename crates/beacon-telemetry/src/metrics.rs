//! OpenTelemetry metrics for Beacon.
//!
//! Metrics are exported over OTLP by a periodic reader. The HTTP instruments are
//! additionally mirrored into the `metrics` facade so an optional Prometheus
//! scrape listener can serve them.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `http.requests_total` | Counter | `http.method`, `http.route`, `http.status_code` | Total requests |
//! | `http.request.duration_ms` | Histogram | same | Request latency in milliseconds |
//! | `http.request.size_bytes` | Histogram | same | Request body size |
//! | `http.response.size_bytes` | Histogram | same | Response body size |
//! | `runtime.tokio.workers` | Gauge | - | Runtime worker threads |
//! | `runtime.tokio.alive_tasks` | Gauge | - | Tasks currently alive |
//! | `runtime.tokio.global_queue_depth` | Gauge | - | Tasks waiting in the injection queue |

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _, ObservableGauge};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Initializes the OTLP meter provider and registers it globally.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the exporter cannot be built.
pub fn init_metrics(config: &TelemetryConfig) -> TelemetryResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp.endpoint_url())
        .with_timeout(config.otlp.batch_export_timeout)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(config.metrics.export_interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider.clone());

    tracing::info!(
        otlp_endpoint = %config.otlp.endpoint,
        service = %config.service_name,
        "OpenTelemetry metrics initialized"
    );

    Ok(provider)
}

/// Returns the service meter from `provider`.
#[must_use]
pub fn meter(provider: &SdkMeterProvider, name: &'static str) -> Meter {
    provider.meter(name)
}

/// Installs the `metrics` facade recorder and serves it on `addr`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a recorder is already installed
/// or the listener cannot be built.
pub fn install_prometheus(addr: SocketAddr) -> TelemetryResult<PrometheusHandle> {
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Prometheus listener stopped");
        }
    });

    describe_http_metrics();

    tracing::info!(addr = %addr, "Prometheus scrape listener started");
    Ok(handle)
}

fn describe_http_metrics() {
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_ms",
        "HTTP request duration in milliseconds"
    );
    describe_histogram!("http_request_size_bytes", "HTTP request body size in bytes");
    describe_histogram!(
        "http_response_size_bytes",
        "HTTP response body size in bytes"
    );
}

// ============================================================================
// Request recording
// ============================================================================

/// One completed request, as seen by the request-log stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeasurement {
    /// HTTP method.
    pub method: String,
    /// Matched route pattern, or the raw path when nothing matched.
    pub route: String,
    /// Effective status code.
    pub status_code: u16,
    /// Wall time spent in the pipeline.
    pub duration: Duration,
    /// Request body size in bytes.
    pub request_size: u64,
    /// Response body size in bytes.
    pub response_size: u64,
}

/// Sink for per-request measurements.
///
/// Implementations are called exactly once per request.
pub trait RequestRecorder: Send + Sync + 'static {
    /// Records one completed request.
    fn record(&self, measurement: &RequestMeasurement);
}

/// A recorder that drops every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl RequestRecorder for NoopRecorder {
    fn record(&self, _measurement: &RequestMeasurement) {}
}

/// The HTTP request instruments.
#[derive(Clone)]
pub struct HttpMetrics {
    requests_total: Counter<u64>,
    request_duration: Histogram<f64>,
    request_size: Histogram<u64>,
    response_size: Histogram<u64>,
}

impl HttpMetrics {
    /// Creates the instruments on `meter`.
    #[must_use]
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("http.requests_total")
                .with_description("Total number of HTTP requests")
                .build(),
            request_duration: meter
                .f64_histogram("http.request.duration_ms")
                .with_description("HTTP request duration in milliseconds")
                .with_unit("ms")
                .build(),
            request_size: meter
                .u64_histogram("http.request.size_bytes")
                .with_description("HTTP request body size in bytes")
                .with_unit("By")
                .build(),
            response_size: meter
                .u64_histogram("http.response.size_bytes")
                .with_description("HTTP response body size in bytes")
                .with_unit("By")
                .build(),
        }
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics").finish_non_exhaustive()
    }
}

impl RequestRecorder for HttpMetrics {
    fn record(&self, m: &RequestMeasurement) {
        let duration_ms = m.duration.as_secs_f64() * 1000.0;
        let attributes = [
            KeyValue::new("http.method", m.method.clone()),
            KeyValue::new("http.route", m.route.clone()),
            KeyValue::new("http.status_code", i64::from(m.status_code)),
        ];

        self.requests_total.add(1, &attributes);
        self.request_duration.record(duration_ms, &attributes);
        self.request_size.record(m.request_size, &attributes);
        self.response_size.record(m.response_size, &attributes);

        // Prometheus mirror; no-ops unless a recorder is installed
        let labels = [
            ("method", m.method.clone()),
            ("route", m.route.clone()),
            ("status", m.status_code.to_string()),
        ];
        counter!("http_requests_total", &labels).increment(1);
        histogram!("http_request_duration_ms", &labels).record(duration_ms);
        histogram!("http_request_size_bytes", &labels).record(m.request_size as f64);
        histogram!("http_response_size_bytes", &labels).record(m.response_size as f64);
    }
}

// ============================================================================
// Runtime metrics
// ============================================================================

/// Observable gauges over the tokio runtime.
///
/// The gauges report for as long as this value is alive.
pub struct RuntimeMetrics {
    _gauges: Vec<ObservableGauge<u64>>,
}

impl std::fmt::Debug for RuntimeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeMetrics")
            .field("gauges", &self._gauges.len())
            .finish()
    }
}

/// Registers runtime gauges for the runtime behind `handle`.
pub fn register_runtime_metrics(meter: &Meter, handle: tokio::runtime::Handle) -> RuntimeMetrics {
    let workers = handle.clone();
    let alive = handle.clone();
    let queue = handle;

    let gauges = vec![
        meter
            .u64_observable_gauge("runtime.tokio.workers")
            .with_description("Number of runtime worker threads")
            .with_callback(move |observer| {
                observer.observe(workers.metrics().num_workers() as u64, &[]);
            })
            .build(),
        meter
            .u64_observable_gauge("runtime.tokio.alive_tasks")
            .with_description("Number of tasks currently alive")
            .with_callback(move |observer| {
                observer.observe(alive.metrics().num_alive_tasks() as u64, &[]);
            })
            .build(),
        meter
            .u64_observable_gauge("runtime.tokio.global_queue_depth")
            .with_description("Tasks waiting in the runtime injection queue")
            .with_callback(move |observer| {
                observer.observe(queue.metrics().global_queue_depth() as u64, &[]);
            })
            .build(),
    ];

    RuntimeMetrics { _gauges: gauges }
}

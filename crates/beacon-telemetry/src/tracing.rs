//! OpenTelemetry distributed tracing for Beacon.
//!
//! This module installs the tracer provider (OTLP/gRPC export through a batch
//! span processor) and the global W3C propagator, and provides the header
//! carriers used to move trace context in and out of HTTP messages.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::default();
//! if let Some(provider) = init_tracing(&config)? {
//!     let tracer = beacon_telemetry::tracing::tracer(&provider, "beacon");
//! }
//! ```

use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, RandomIdGenerator, Sampler, Tracer, TracerProvider,
};

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Initializes the tracing subsystem.
///
/// Returns `None` when tracing is disabled; in that case no provider or
/// propagator is installed and no spans are produced.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.tracing.enabled {
        tracing::info!("Tracing is disabled");
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp.endpoint_url())
        .with_timeout(config.otlp.batch_export_timeout)
        .build()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    let batch = BatchConfigBuilder::default()
        .with_scheduled_delay(config.otlp.batch_timeout)
        .with_max_queue_size(config.otlp.batch_max_queue_size)
        .with_max_export_batch_size(config.tracing.export_batch)
        .with_max_export_timeout(config.otlp.batch_export_timeout)
        .build();

    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch)
        .build();

    let provider = TracerProvider::builder()
        .with_span_processor(processor)
        .with_sampler(sampler(config.tracing.sample_rate))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(config.resource())
        .build();

    global::set_tracer_provider(provider.clone());
    install_propagator();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        otlp_endpoint = %config.otlp.endpoint,
        sample_rate = config.tracing.sample_rate,
        "OpenTelemetry tracer initialized"
    );

    Ok(Some(provider))
}

/// Returns the sampler for a root sample rate.
///
/// Child spans follow their parent's decision; roots are sampled by trace ID.
#[must_use]
pub fn sampler(rate: f64) -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(rate)))
}

/// Installs the global W3C trace-context + baggage propagator.
pub fn install_propagator() {
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));
}

/// Returns a tracer from `provider`.
#[must_use]
pub fn tracer(provider: &TracerProvider, name: &'static str) -> Tracer {
    provider.tracer(name)
}

/// Extracts trace context from HTTP headers using the global propagator.
pub fn extract_context<T: opentelemetry::propagation::Extractor>(
    headers: &T,
) -> opentelemetry::Context {
    global::get_text_map_propagator(|propagator| propagator.extract(headers))
}

/// Injects trace context into HTTP headers using the global propagator.
pub fn inject_context<T: opentelemetry::propagation::Injector>(
    context: &opentelemetry::Context,
    headers: &mut T,
) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(context, headers);
    });
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl opentelemetry::propagation::Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}

/// HTTP header injector for `http::HeaderMap`.
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl opentelemetry::propagation::Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            http::header::HeaderName::try_from(key),
            http::header::HeaderValue::try_from(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
    use opentelemetry::trace::TraceContextExt;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_header_extractor() {
        let mut headers = http::HeaderMap::new();
        headers.insert("traceparent", "test-value".parse().unwrap());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("test-value"));
        assert!(extractor.get("nonexistent").is_none());
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }

    #[test]
    fn test_header_injector() {
        let mut headers = http::HeaderMap::new();

        {
            let mut injector = HeaderInjector(&mut headers);
            injector.set("traceparent", "injected-value".to_string());
        }

        assert_eq!(
            headers.get("traceparent").unwrap().to_str().unwrap(),
            "injected-value"
        );
    }

    #[test]
    fn test_trace_context_round_trip() {
        let propagator = TraceContextPropagator::new();

        let mut incoming = http::HeaderMap::new();
        incoming.insert("traceparent", TRACEPARENT.parse().unwrap());
        let cx = propagator.extract(&HeaderExtractor(&incoming));
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        let mut outgoing = http::HeaderMap::new();
        propagator.inject_context(&cx, &mut HeaderInjector(&mut outgoing));
        assert_eq!(outgoing.get("traceparent").unwrap(), TRACEPARENT);
    }

    #[test]
    fn test_disabled_tracing() {
        let config = TelemetryConfig::builder().tracing_enabled(false).build();

        let result = init_tracing(&config);
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_sampler_is_parent_based() {
        assert!(matches!(sampler(0.5), Sampler::ParentBased(_)));
    }
}

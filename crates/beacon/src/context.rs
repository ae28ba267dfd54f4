//! The subsystem registry.
//!
//! [`AppContext`] is constructed once in `main`, filled in by the bootstrap
//! lifecycle steps, and torn down by their shutdown hooks. Nothing here is
//! global: every subsystem handle lives in this struct and is passed by
//! reference.

use std::sync::Arc;

use beacon_config::BeaconConfig;
use beacon_middleware::Pipeline;
use beacon_storage::{CacheClient, UserStore};
use beacon_telemetry::{HttpMetrics, RuntimeMetrics, TelemetryConfig};
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};

/// Instrumentation scope used for the service tracer and meter.
pub const INSTRUMENTATION_SCOPE: &str = "beacon";

/// Handles to every initialized subsystem.
///
/// A field is `None` until its lifecycle step has run, and stays `None` for
/// subsystems that are switched off (tracing, OTLP log export).
pub struct AppContext {
    /// Loaded service configuration.
    pub config: BeaconConfig,
    /// Telemetry settings derived from `config`.
    pub telemetry: TelemetryConfig,
    /// OTLP log provider.
    pub logger_provider: Option<LoggerProvider>,
    /// OTLP tracer provider.
    pub tracer_provider: Option<TracerProvider>,
    /// OTLP meter provider.
    pub meter_provider: Option<SdkMeterProvider>,
    /// HTTP request instruments.
    pub http_metrics: Option<HttpMetrics>,
    /// Runtime gauges; they report while held.
    pub runtime_metrics: Option<RuntimeMetrics>,
    /// The user store.
    pub store: Option<Arc<dyn UserStore>>,
    /// The cache client.
    pub cache: Option<Arc<dyn CacheClient>>,
}

impl AppContext {
    /// Creates an empty registry for `config`.
    #[must_use]
    pub fn new(config: BeaconConfig) -> Self {
        let telemetry = TelemetryConfig::from(&config.telemetry);
        Self {
            config,
            telemetry,
            logger_provider: None,
            tracer_provider: None,
            meter_provider: None,
            http_metrics: None,
            runtime_metrics: None,
            store: None,
            cache: None,
        }
    }

    /// Returns the service tracer, if tracing is on.
    #[must_use]
    pub fn tracer(&self) -> Option<Tracer> {
        self.tracer_provider
            .as_ref()
            .map(|provider| beacon_telemetry::tracing::tracer(provider, INSTRUMENTATION_SCOPE))
    }

    /// Builds the request pipeline over the initialized telemetry.
    ///
    /// Without a tracer the tracing stage is left out; without metrics requests
    /// are logged but not measured.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        let mut builder = Pipeline::builder().service_name(self.config.telemetry.service_name.clone());
        if let Some(tracer) = self.tracer() {
            builder = builder.tracer(tracer);
        }
        if let Some(metrics) = &self.http_metrics {
            builder = builder.recorder(Arc::new(metrics.clone()));
        }
        builder.build()
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("service", &self.config.telemetry.service_name)
            .field("logs_exported", &self.logger_provider.is_some())
            .field("tracing", &self.tracer_provider.is_some())
            .field("metrics", &self.meter_provider.is_some())
            .field("store", &self.store.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_empty() {
        let ctx = AppContext::new(BeaconConfig::default());
        assert!(ctx.tracer().is_none());
        assert!(ctx.store.is_none());
        assert!(ctx.cache.is_none());
        assert_eq!(ctx.telemetry.service_name, ctx.config.telemetry.service_name);
    }

    #[test]
    fn test_pipeline_without_tracer() {
        let ctx = AppContext::new(BeaconConfig::default());
        assert_eq!(ctx.pipeline().stage_names(), vec!["recovery", "request_log"]);
    }

    #[test]
    fn test_pipeline_with_tracer() {
        let mut ctx = AppContext::new(BeaconConfig::default());
        ctx.tracer_provider = Some(TracerProvider::builder().build());
        assert_eq!(
            ctx.pipeline().stage_names(),
            vec!["recovery", "tracing", "request_log"]
        );
    }
}

//! Telemetry configuration.

use beacon_config::{
    BuildInfo, LoggingConfig, MetricsConfig, OtlpConfig, TelemetryConfigSection, TracingConfig,
};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

/// Configuration for all telemetry subsystems.
///
/// Built from the `[telemetry]` section of the service configuration plus the
/// build metadata stamped at compile time.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name (used in metrics, traces, and logs).
    pub service_name: String,

    /// Service version.
    pub service_version: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// Build metadata.
    pub build: BuildInfo,

    /// OTLP exporter settings.
    pub otlp: OtlpConfig,

    /// Tracing configuration.
    pub tracing: TracingConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }

    /// Returns the OpenTelemetry resource describing this service.
    ///
    /// Shared by the log, trace and meter providers.
    #[must_use]
    pub fn resource(&self) -> Resource {
        Resource::new([
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                self.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                self.service_version.clone(),
            ),
            KeyValue::new("deployment.environment", self.environment.clone()),
            KeyValue::new("build.commit", self.build.commit),
            KeyValue::new("build.time", self.build.time),
        ])
    }
}

impl From<&TelemetryConfigSection> for TelemetryConfig {
    fn from(section: &TelemetryConfigSection) -> Self {
        Self {
            service_name: section.service_name.clone(),
            service_version: section.service_version.clone(),
            environment: section.environment.clone(),
            build: BuildInfo::current(),
            otlp: section.otlp.clone(),
            tracing: section.tracing.clone(),
            metrics: section.metrics.clone(),
            logging: section.logging.clone(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from(&TelemetryConfigSection::default())
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Sets the service version.
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.config.service_version = version.into();
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.config.environment = env.into();
        self
    }

    /// Sets the OTLP collector endpoint.
    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.otlp.endpoint = endpoint.into();
        self
    }

    /// Enables or disables tracing.
    #[must_use]
    pub fn tracing_enabled(mut self, enabled: bool) -> Self {
        self.config.tracing.enabled = enabled;
        self
    }

    /// Sets the trace sample rate.
    #[must_use]
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.tracing.sample_rate = rate;
        self
    }

    /// Enables or disables OTLP log export.
    #[must_use]
    pub fn otlp_logs(mut self, enabled: bool) -> Self {
        self.config.logging.otlp_enabled = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}

impl Default for TelemetryConfigBuilder {
    fn default() -> Self {
        Self {
            config: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::builder()
            .service_name("users-api")
            .service_version("1.2.3")
            .environment("staging")
            .tracing_enabled(false)
            .build();

        assert_eq!(config.service_name, "users-api");
        assert_eq!(config.service_version, "1.2.3");
        assert_eq!(config.environment, "staging");
        assert!(!config.tracing.enabled);
    }

    #[test]
    fn test_resource_attributes() {
        let config = TelemetryConfig::builder()
            .service_name("users-api")
            .environment("production")
            .build();
        let resource = config.resource();

        assert_eq!(
            resource.get(Key::new("service.name")).map(|v| v.to_string()),
            Some("users-api".to_string())
        );
        assert_eq!(
            resource
                .get(Key::new("deployment.environment"))
                .map(|v| v.to_string()),
            Some("production".to_string())
        );
        assert!(resource.get(Key::new("build.commit")).is_some());
        assert!(resource.get(Key::new("build.time")).is_some());
    }
}

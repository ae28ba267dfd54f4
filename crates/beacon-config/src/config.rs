//! Main configuration types.
//!
//! This module provides the top-level [`BeaconConfig`] struct and its builder.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{
    CacheConfig, ConfigError, DatabaseConfig, RedisConfig, ServerConfig, TelemetryConfigSection,
};

/// Complete Beacon service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use beacon_config::BeaconConfig;
///
/// let config = BeaconConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:3002");
/// assert_eq!(config.telemetry.service_name, "beacon");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BeaconConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telemetry configuration (logs, traces, metrics).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,

    /// PostgreSQL configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache-aside configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl BeaconConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> BeaconConfigBuilder {
        BeaconConfigBuilder::new()
    }

    /// Returns the parsed HTTP bind address.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })
    }

    /// Returns the parsed Prometheus listener address, if one is configured.
    pub fn prometheus_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.telemetry
            .metrics
            .prometheus_addr
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|_| {
                    ConfigError::invalid_value(
                        "telemetry.metrics.prometheus_addr",
                        format!("invalid socket address: {addr}"),
                    )
                })
            })
            .transpose()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The server or Prometheus address is invalid
    /// - The service name is empty
    /// - The sample rate is not in 0.0..=1.0
    /// - The pool bounds are inverted
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_addr()?;
        self.prometheus_addr()?;

        if self.telemetry.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.service_name",
                "must not be empty",
            ));
        }

        if !(0.0..=1.0).contains(&self.telemetry.tracing.sample_rate) {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.sample_rate",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::invalid_value(
                "database.min_connections",
                "must not exceed database.max_connections",
            ));
        }

        Ok(())
    }
}

/// Builder for [`BeaconConfig`].
#[derive(Debug, Default)]
pub struct BeaconConfigBuilder {
    server: Option<ServerConfig>,
    telemetry: Option<TelemetryConfigSection>,
    database: Option<DatabaseConfig>,
    redis: Option<RedisConfig>,
    cache: Option<CacheConfig>,
}

impl BeaconConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the database configuration.
    #[must_use]
    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    /// Set the Redis configuration.
    #[must_use]
    pub fn redis(mut self, redis: RedisConfig) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Set the cache configuration.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> BeaconConfig {
        BeaconConfig {
            server: self.server.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            database: self.database.unwrap_or_default(),
            redis: self.redis.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<BeaconConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, `.env` and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{parse_duration, BeaconConfig, ConfigError, LogFormat};

/// Environment variable naming an optional TOML/JSON config file.
pub const CONFIG_FILE_VAR: &str = "BEACON_CONFIG";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. `.env` file (merged into the process environment)
/// 4. Environment variables
///
/// Environment variables are read from the process by default. Tests pass an
/// explicit map with [`with_env_source`](Self::with_env_source) instead.
///
/// # Example
///
/// ```no_run
/// use beacon_config::ConfigLoader;
///
/// # fn main() -> Result<(), beacon_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("beacon.toml")?
///     .with_dotenv()
///     .with_env()
///     .load()?;
///
/// println!("Server will listen on: {}", config.server.http_addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BeaconConfig,
    env: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BeaconConfig::default(),
            env: None,
        }
    }

    /// Load the standard layering used by the service binary.
    ///
    /// Reads `.env`, then the file named by `BEACON_CONFIG` (if set), then the
    /// process environment.
    pub fn from_environment() -> Result<BeaconConfig, ConfigError> {
        let loader = Self::new().with_dotenv();
        let loader = match env::var(CONFIG_FILE_VAR) {
            Ok(path) if !path.is_empty() => loader.with_file(path)?,
            _ => loader,
        };
        loader.with_env().load()
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, or
    /// contains invalid or unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:3000"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// Variables already set in the environment are not overwritten.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.env = Some(env::vars().collect());
        self
    }

    /// Apply overrides from an explicit variable map.
    #[must_use]
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Finalize and return the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or the
    /// final configuration fails validation.
    pub fn load(mut self) -> Result<BeaconConfig, ConfigError> {
        if let Some(vars) = self.env.take() {
            self.apply_env_overrides(&vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BeaconConfig {
        self.config
    }

    // Parse configuration file based on extension
    fn parse_file(content: &str, path: &Path) -> Result<BeaconConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        // Empty values count as unset
        let get = |key: &str| vars.get(key).map(String::as_str).filter(|v| !v.is_empty());

        for (key, value) in vars {
            if !value.is_empty() {
                self.apply_env_var(key, value)?;
            }
        }

        if get("DATABASE_URL").is_none() {
            let parts = ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_NAME"];
            if parts.iter().any(|key| get(key).is_some()) {
                self.config.database.url = format!(
                    "postgres://{}:{}@{}:{}/{}?sslmode=disable",
                    get("DB_USER").unwrap_or("appuser"),
                    get("DB_PASSWORD").unwrap_or("apppass"),
                    get("DB_HOST").unwrap_or("localhost"),
                    get("DB_PORT").unwrap_or("5432"),
                    get("DB_NAME").unwrap_or("appdb"),
                );
            }
        }

        if get("REDIS_URL").is_none() && (get("REDIS_HOST").is_some() || get("REDIS_PORT").is_some())
        {
            self.config.redis.url = format!(
                "redis://{}:{}/0",
                get("REDIS_HOST").unwrap_or("localhost"),
                get("REDIS_PORT").unwrap_or("6379"),
            );
        }

        Ok(())
    }

    // Apply a single environment variable; unknown keys are ignored
    fn apply_env_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let config = &mut self.config;

        match key {
            // Service identity
            "OTEL_SERVICE_NAME" => config.telemetry.service_name = value.to_string(),
            "OTEL_SERVICE_VERSION" => config.telemetry.service_version = value.to_string(),
            "OTEL_ENVIRONMENT" => config.telemetry.environment = value.to_string(),

            // OTLP exporter
            "OTEL_EXPORTER_OTLP_ENDPOINT" => config.telemetry.otlp.endpoint = value.to_string(),
            "OTEL_EXPORTER_OTLP_INSECURE" => {
                config.telemetry.otlp.insecure = parse_bool_var(key, value)?;
            }
            "OTEL_BATCH_TIMEOUT" => {
                config.telemetry.otlp.batch_timeout = parse_duration_var(key, value)?;
            }
            "OTEL_BATCH_MAX_QUEUE_SIZE" => {
                config.telemetry.otlp.batch_max_queue_size = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }
            "OTEL_BATCH_EXPORT_TIMEOUT" => {
                config.telemetry.otlp.batch_export_timeout = parse_duration_var(key, value)?;
            }

            // Tracing
            "OTEL_TRACING_ENABLED" => {
                config.telemetry.tracing.enabled = parse_bool_var(key, value)?;
            }
            "OTEL_TRACE_SAMPLE_RATE" => {
                config.telemetry.tracing.sample_rate = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected float"))?;
            }
            "OTEL_TRACE_EXPORT_BATCH" => {
                config.telemetry.tracing.export_batch = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            // Metrics
            "OTEL_METRIC_EXPORT_INTERVAL" => {
                config.telemetry.metrics.export_interval = parse_duration_var(key, value)?;
            }
            "METRICS_PROMETHEUS_ADDR" => {
                config.telemetry.metrics.prometheus_addr = Some(value.to_string());
            }

            // Logging
            "LOG_LEVEL" => config.telemetry.logging.level = value.to_string(),
            "LOG_FORMAT" => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            "OTEL_LOGS_ENABLED" => {
                config.telemetry.logging.otlp_enabled = parse_bool_var(key, value)?;
            }

            // Server
            "HTTP_ADDR" => config.server.http_addr = value.to_string(),
            "SHUTDOWN_TIMEOUT" => config.server.shutdown_timeout = parse_duration_var(key, value)?,
            "REQUEST_TIMEOUT" => config.server.request_timeout = parse_duration_var(key, value)?,

            // Storage
            "DATABASE_URL" => config.database.url = value.to_string(),
            "REDIS_URL" => config.redis.url = value.to_string(),
            "CACHE_USER_TTL" => config.cache.user_ttl = parse_duration_var(key, value)?,

            _ => {}
        }

        Ok(())
    }
}

fn parse_duration_var(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::env_parse_error(key, "expected duration like 10s or 5m"))
}

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

//! Typed configuration for Beacon.
//!
//! Configuration is layered (defaults → file → `.env` → environment) and
//! validated once at startup:
//!
//! - [`ServerConfig`] - HTTP bind address, request/shutdown timeouts
//! - [`TelemetryConfigSection`] - service identity, OTLP, tracing, metrics, logging
//! - [`DatabaseConfig`], [`RedisConfig`], [`CacheConfig`] - storage
//!
//! # Example
//!
//! ```no_run
//! use beacon_config::ConfigLoader;
//!
//! # fn main() -> Result<(), beacon_config::ConfigError> {
//! let config = ConfigLoader::from_environment()?;
//! println!("Server will listen on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:3002"
//! shutdown_timeout = "10s"
//! request_timeout = "30s"
//!
//! [telemetry]
//! service_name = "beacon"
//! environment = "production"
//!
//! [telemetry.otlp]
//! endpoint = "otel-collector:4317"
//! insecure = true
//!
//! [telemetry.tracing]
//! sample_rate = 0.1
//!
//! [cache]
//! user_ttl = "10m"
//! ```
//!
//! # Environment Variables
//!
//! The usual OpenTelemetry names are honored (`OTEL_SERVICE_NAME`,
//! `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_TRACE_SAMPLE_RATE`, ...) alongside
//! `HTTP_ADDR`, `DATABASE_URL` or `DB_*`, `REDIS_URL` or `REDIS_*`, and
//! `CACHE_USER_TTL`.

#![warn(missing_docs)]

mod config;
mod duration;
mod error;
mod loader;
mod schema;

pub use config::{BeaconConfig, BeaconConfigBuilder};
pub use duration::{format_duration, parse_duration};
pub use error::ConfigError;
pub use loader::{ConfigLoader, CONFIG_FILE_VAR};
pub use schema::*;

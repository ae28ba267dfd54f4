//! Errors raised while loading or validating configuration.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration source could not be read, parsed or accepted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `BEACON_CONFIG` or `--config` names a file that does not exist.
    #[error("config file {path} does not exist")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {path}")]
    ReadError {
        /// Requested path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`BeaconConfig`](crate::BeaconConfig).
    #[error("malformed TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The file is not valid JSON for [`BeaconConfig`](crate::BeaconConfig).
    #[error("malformed JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A loaded value was rejected by validation.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `telemetry.tracing.sample_rate`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment variable is set but cannot be parsed.
    #[error("environment variable {var}: {reason}")]
    EnvParseError {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The configuration as a whole cannot be used.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::FileNotFound`].
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Shorthand for [`ConfigError::ReadError`].
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConfigError::EnvParseError`].
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConfigError::ValidationError`].
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/beacon/beacon.toml");
        assert!(err.to_string().contains("/etc/beacon/beacon.toml"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("server.http_addr", "not a valid address");
        assert!(err.to_string().contains("server.http_addr"));
        assert!(err.to_string().contains("not a valid address"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("CACHE_USER_TTL", "expected duration");
        assert!(err.to_string().contains("CACHE_USER_TTL"));
        assert!(err.to_string().contains("expected duration"));
    }
}

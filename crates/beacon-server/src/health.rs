//! Dependency health reports.
//!
//! A [`HealthReport`] collects one [`DependencyStatus`] per named dependency.
//! The service is healthy only if every dependency is up.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::{DependencyStatus, HealthReport};
//! use http::StatusCode;
//!
//! let report = HealthReport::new()
//!     .with("database", DependencyStatus::Up)
//!     .with("redis", DependencyStatus::Down);
//!
//! assert!(!report.is_healthy());
//! assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);
//! ```

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every dependency is up.
    Healthy,
    /// At least one dependency is down.
    Unhealthy,
}

/// Reachability of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStatus {
    /// The dependency answered.
    Up,
    /// The dependency did not answer.
    Down,
}

impl DependencyStatus {
    /// Maps a probe outcome to a status.
    #[must_use]
    pub fn from_probe<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Self::Up
        } else {
            Self::Down
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    status: HealthStatus,
    dependencies: BTreeMap<String, DependencyStatus>,
}

impl HealthReport {
    /// Creates a report with no dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            dependencies: BTreeMap::new(),
        }
    }

    /// Records the status of dependency `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, status: DependencyStatus) -> Self {
        self.dependencies.insert(name.into(), status);
        if status == DependencyStatus::Down {
            self.status = HealthStatus::Unhealthy;
        }
        self
    }

    /// Returns the overall status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns the status of dependency `name`.
    #[must_use]
    pub fn dependency(&self, name: &str) -> Option<DependencyStatus> {
        self.dependencies.get(name).copied()
    }

    /// Returns true if every dependency is up.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// `200` when healthy, `503` otherwise.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_up_is_healthy() {
        let report = HealthReport::new()
            .with("database", DependencyStatus::Up)
            .with("redis", DependencyStatus::Up);
        assert!(report.is_healthy());
        assert_eq!(report.status_code(), StatusCode::OK);
    }

    #[test]
    fn test_serialized_shape() {
        let report = HealthReport::new()
            .with("redis", DependencyStatus::Down)
            .with("database", DependencyStatus::Up);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "unhealthy",
                "dependencies": {"database": "up", "redis": "down"}
            })
        );
    }

    #[test]
    fn test_from_probe() {
        assert_eq!(DependencyStatus::from_probe(&Ok::<(), ()>(())), DependencyStatus::Up);
        assert_eq!(DependencyStatus::from_probe(&Err::<(), _>("refused")), DependencyStatus::Down);
        assert_eq!(
            HealthReport::new()
                .with("database", DependencyStatus::Down)
                .dependency("database"),
            Some(DependencyStatus::Down)
        );
    }
}

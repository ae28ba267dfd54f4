//! Bounded-time flush and shutdown of the telemetry providers.
//!
//! Provider shutdown blocks until the background exporter drains, so it runs on
//! the blocking pool under a timeout.

use std::time::Duration;

use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Flushes and shuts down the tracer provider.
pub async fn shutdown_tracer_provider(
    provider: TracerProvider,
    timeout: Duration,
) -> TelemetryResult<()> {
    run_blocking("tracer provider", timeout, move || {
        provider.shutdown().map_err(|e| e.to_string())
    })
    .await
}

/// Flushes and shuts down the meter provider.
pub async fn shutdown_meter_provider(
    provider: SdkMeterProvider,
    timeout: Duration,
) -> TelemetryResult<()> {
    run_blocking("meter provider", timeout, move || {
        provider.shutdown().map_err(|e| e.to_string())
    })
    .await
}

/// Flushes and shuts down the log provider.
pub async fn shutdown_logger_provider(
    provider: LoggerProvider,
    timeout: Duration,
) -> TelemetryResult<()> {
    run_blocking("logger provider", timeout, move || {
        provider.shutdown().map_err(|e| e.to_string())
    })
    .await
}

async fn run_blocking<F>(name: &'static str, timeout: Duration, f: F) -> TelemetryResult<()>
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!(provider = name, "Provider shut down successfully");
            Ok(())
        }
        Ok(Ok(Err(reason))) => Err(TelemetryError::Shutdown {
            provider: name,
            reason,
        }),
        Ok(Err(join_error)) => Err(TelemetryError::Shutdown {
            provider: name,
            reason: join_error.to_string(),
        }),
        Err(_) => Err(TelemetryError::ShutdownTimeout(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    #[tokio::test]
    async fn test_tracer_provider_shutdown() {
        let provider = TracerProvider::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .build();

        shutdown_tracer_provider(provider, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_meter_provider_shutdown() {
        let provider = SdkMeterProvider::builder().build();
        shutdown_meter_provider(provider, Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let result = run_blocking("test provider", Duration::from_secs(1), || {
            Err("exporter unreachable".to_string())
        })
        .await;

        assert!(matches!(
            result,
            Err(TelemetryError::Shutdown { provider: "test provider", .. })
        ));
    }

    #[tokio::test]
    async fn test_hang_is_bounded() {
        let result = run_blocking("slow provider", Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(TelemetryError::ShutdownTimeout("slow provider"))
        ));
    }
}

//! Subsystem startup and teardown.
//!
//! # Steps
//!
//! | # | Step | Init | Shutdown |
//! |---|------|------|----------|
//! | 1 | `logging` | subscriber + OTLP log bridge | flush log provider |
//! | 2 | `tracing` | tracer provider + propagator (skipped when disabled) | flush tracer provider |
//! | 3 | `metrics` | meter provider, HTTP instruments, runtime gauges, Prometheus listener | flush meter provider |
//! | 4 | `postgres` | connection pool + periodic health check | close pool |
//! | 5 | `redis` | client + `PING` | close client |
//! | 6 | `migrations` | `users` schema | - |
//!
//! Shutdown runs the hooks of started steps in reverse, so the cache closes
//! first and the log provider flushes last.

use std::sync::Arc;

use beacon_config::ServerConfig;
use beacon_server::{Lifecycle, StepFuture, StepResult};
use beacon_storage::{PgUserStore, RedisCache};

use crate::context::{AppContext, INSTRUMENTATION_SCOPE};

/// Builds the service lifecycle with the timeouts from `server`.
pub fn lifecycle(server: &ServerConfig) -> Lifecycle<AppContext> {
    Lifecycle::new()
        .startup_timeout(server.startup_timeout)
        .step_shutdown_timeout(server.step_shutdown_timeout)
        .step_with_shutdown("logging", logging, close_logging)
        .step_with_shutdown("tracing", tracing, close_tracing)
        .step_with_shutdown("metrics", metrics, close_metrics)
        .step_with_shutdown("postgres", postgres, close_postgres)
        .step_with_shutdown("redis", redis, close_redis)
        .step("migrations", migrations)
}

// ============================================================================
// Telemetry
// ============================================================================

fn logging(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(start_logging(ctx))
}

async fn start_logging(ctx: &mut AppContext) -> StepResult {
    ctx.logger_provider = beacon_telemetry::init_logging(&ctx.telemetry)?;
    Ok(())
}

fn close_logging(ctx: &AppContext) -> StepFuture<'_> {
    Box::pin(stop_logging(ctx))
}

async fn stop_logging(ctx: &AppContext) -> StepResult {
    if let Some(provider) = ctx.logger_provider.clone() {
        beacon_telemetry::shutdown_logger_provider(provider, ctx.config.server.step_shutdown_timeout)
            .await?;
    }
    Ok(())
}

fn tracing(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(start_tracing(ctx))
}

async fn start_tracing(ctx: &mut AppContext) -> StepResult {
    ctx.tracer_provider = beacon_telemetry::init_tracing(&ctx.telemetry)?;
    Ok(())
}

fn close_tracing(ctx: &AppContext) -> StepFuture<'_> {
    Box::pin(stop_tracing(ctx))
}

async fn stop_tracing(ctx: &AppContext) -> StepResult {
    if let Some(provider) = ctx.tracer_provider.clone() {
        beacon_telemetry::shutdown_tracer_provider(provider, ctx.config.server.step_shutdown_timeout)
            .await?;
    }
    Ok(())
}

fn metrics(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(start_metrics(ctx))
}

async fn start_metrics(ctx: &mut AppContext) -> StepResult {
    let provider = beacon_telemetry::init_metrics(&ctx.telemetry)?;
    let meter = beacon_telemetry::metrics::meter(&provider, INSTRUMENTATION_SCOPE);

    ctx.http_metrics = Some(beacon_telemetry::HttpMetrics::new(&meter));
    ctx.runtime_metrics = Some(beacon_telemetry::register_runtime_metrics(
        &meter,
        tokio::runtime::Handle::current(),
    ));
    ctx.meter_provider = Some(provider);

    if let Some(addr) = ctx.config.prometheus_addr()? {
        beacon_telemetry::install_prometheus(addr)?;
    }
    Ok(())
}

fn close_metrics(ctx: &AppContext) -> StepFuture<'_> {
    Box::pin(stop_metrics(ctx))
}

async fn stop_metrics(ctx: &AppContext) -> StepResult {
    if let Some(provider) = ctx.meter_provider.clone() {
        beacon_telemetry::shutdown_meter_provider(provider, ctx.config.server.step_shutdown_timeout)
            .await?;
    }
    Ok(())
}

// ============================================================================
// Storage
// ============================================================================

fn postgres(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(start_postgres(ctx))
}

async fn start_postgres(ctx: &mut AppContext) -> StepResult {
    let store = PgUserStore::connect(&ctx.config.database).await?;
    store.start_health_check(ctx.config.database.health_check_interval);
    ctx.store = Some(Arc::new(store));
    Ok(())
}

fn close_postgres(ctx: &AppContext) -> StepFuture<'_> {
    Box::pin(stop_postgres(ctx))
}

async fn stop_postgres(ctx: &AppContext) -> StepResult {
    if let Some(store) = &ctx.store {
        store.close().await;
    }
    Ok(())
}

fn redis(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(start_redis(ctx))
}

async fn start_redis(ctx: &mut AppContext) -> StepResult {
    let cache = RedisCache::connect(&ctx.config.redis).await?;
    ctx.cache = Some(Arc::new(cache));
    Ok(())
}

fn close_redis(ctx: &AppContext) -> StepFuture<'_> {
    Box::pin(stop_redis(ctx))
}

async fn stop_redis(ctx: &AppContext) -> StepResult {
    if let Some(cache) = &ctx.cache {
        cache.close().await?;
    }
    Ok(())
}

fn migrations(ctx: &mut AppContext) -> StepFuture<'_> {
    Box::pin(run_migrations(ctx))
}

async fn run_migrations(ctx: &mut AppContext) -> StepResult {
    let store = ctx.store.as_ref().ok_or("database is not initialized")?;
    store.migrate().await?;
    Ok(())
}

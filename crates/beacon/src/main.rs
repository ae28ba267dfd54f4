//! Beacon - Entry point
//!
//! Loads configuration, starts the subsystems in order, serves HTTP until
//! SIGINT/SIGTERM, then drains connections and tears the subsystems down.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use beacon::{bootstrap, routes, ApiState, AppContext};
use beacon_config::{BeaconConfig, ConfigLoader};
use beacon_server::Server;

/// Command-line arguments.
struct Args {
    /// Path to a configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self, ExitCode> {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => config = args.next().map(PathBuf::from),
                "--help" | "-h" => {
                    print_help();
                    return Err(ExitCode::SUCCESS);
                }
                "--version" | "-v" => {
                    println!("beacon {}", beacon::VERSION);
                    return Err(ExitCode::SUCCESS);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    return Err(ExitCode::FAILURE);
                }
            }
        }

        Ok(Self { config })
    }
}

fn print_help() {
    println!(
        r"Beacon - Observable user service

USAGE:
    beacon [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    BEACON_CONFIG                  Configuration file (same as --config)
    HTTP_ADDR                      Listen address (default: 0.0.0.0:3002)
    DATABASE_URL                   PostgreSQL URL
    REDIS_URL                      Redis URL
    OTEL_EXPORTER_OTLP_ENDPOINT    OTLP collector (default: localhost:4317)
    OTEL_TRACING_ENABLED           Enable trace export (default: true)
    LOG_LEVEL, LOG_FORMAT          Log filter and json|pretty
"
    );
}

fn load_config(args: &Args) -> anyhow::Result<BeaconConfig> {
    let config = match &args.config {
        Some(path) => ConfigLoader::new()
            .with_dotenv()
            .with_file(path)?
            .with_env()
            .load()?,
        None => ConfigLoader::from_environment()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(code) => return code,
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            eprintln!("beacon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BeaconConfig) -> anyhow::Result<()> {
    let mut ctx = AppContext::new(config);
    let mut lifecycle = bootstrap::lifecycle(&ctx.config.server);

    lifecycle
        .start(&mut ctx)
        .await
        .context("failed to start subsystems")?;

    let served = serve(&ctx).await;

    tracing::info!("Server shutdown complete");
    if let Err(e) = lifecycle.shutdown(&ctx).await {
        tracing::error!(error = %e, "Subsystem shutdown incomplete");
    }

    served
}

async fn serve(ctx: &AppContext) -> anyhow::Result<()> {
    let state = ApiState::from_context(ctx).context("storage subsystems are not initialized")?;

    let server = Server::builder()
        .config(ctx.config.server.clone())
        .router(routes::router(Arc::new(state)))
        .pipeline(ctx.pipeline())
        .build();

    tracing::info!(
        addr = %ctx.config.server.http_addr,
        service = %ctx.config.telemetry.service_name,
        version = %ctx.config.telemetry.service_version,
        "Starting server"
    );

    server.run().await.context("server error")
}

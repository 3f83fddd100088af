//! Tomato Disease Inference Server
//!
//! Loads a model artifact once at startup and serves predictions over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use tomato_disease::backend::{backend_name, default_device, InferenceBackend};
use tomato_disease::inference::Predictor;
use tomato_disease::utils::logging::{init_logging, LogConfig, LogLevel};
use tomato_server::state::DEFAULT_MAX_UPLOAD_BYTES;
use tomato_server::{app, AppState, ServerConfig};

/// Tomato Disease Inference Server
#[derive(Parser, Debug)]
#[command(name = "tomato_server")]
#[command(version)]
#[command(about = "HTTP inference service for the tomato leaf disease classifier")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Artifact root directory
    #[arg(long, env = "TOMATO_MODEL_DIR", default_value = "saved_model")]
    model_dir: PathBuf,

    /// Artifact version to serve (defaults to the highest)
    #[arg(long, env = "TOMATO_MODEL_VERSION")]
    model_version: Option<u32>,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Enable verbose logging (debug level, module paths and thread ids)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level: trace, debug, info, warn or error
    #[arg(
        long,
        env = "TOMATO_LOG_LEVEL",
        value_parser = LogLevel::parse,
        default_value_t = LogLevel::Info
    )]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::server().from_flags(cli.log_level, cli.verbose);
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_dir: cli.model_dir,
        model_version: cli.model_version,
        max_upload_bytes: cli.max_upload_bytes,
    };

    info!(
        "Tomato Disease Server v{} (tomato_disease v{})",
        env!("CARGO_PKG_VERSION"),
        tomato_disease::VERSION
    );
    info!("  Log level: {}", log_config.level);
    info!("  Backend:   {}", backend_name());
    info!("  Model dir: {:?}", config.model_dir);

    let predictor = Predictor::<InferenceBackend>::from_artifact(
        &config.model_dir,
        config.model_version,
        default_device(),
    )
    .inspect_err(|e| error!("Failed to load model: {}", e))
    .with_context(|| format!("Failed to load model from {:?}", config.model_dir))?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config, predictor));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

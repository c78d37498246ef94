//! Speedmark Traffic Server
//!
//! Serves synthetic download payloads and drains upload bodies so a client
//! can measure achieved throughput in both directions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use speedmark_common::cors::AllowList;
use speedmark_common::DEFAULT_MAX_UPLOAD_BYTES;
use speedmark_server::{app, metrics, AppState};

#[derive(Parser, Debug)]
#[command(name = "speedmark-server")]
#[command(version)]
#[command(about = "Speedmark traffic server - synthetic download/upload endpoints", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Comma-separated CORS allow-list ("*" for any origin)
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    cors_origins: String,

    /// Maximum accepted upload body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: u64,

    /// Record best-effort per-request metrics
    #[arg(long, env = "ENABLE_METRICS", default_value_t = false)]
    enable_metrics: bool,

    /// Metrics database path
    #[arg(long, env = "METRICS_DB", default_value = "speedmark-metrics.db")]
    metrics_db: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Speedmark traffic server v{}", env!("CARGO_PKG_VERSION"));

    let metrics = if args.enable_metrics {
        Some(
            metrics::spawn_store(&args.metrics_db)
                .context("Failed to open metrics store")?,
        )
    } else {
        None
    };

    let state = AppState {
        allow_list: AllowList::parse(&args.cors_origins),
        max_upload_bytes: args.max_upload_bytes,
        metrics,
    };

    info!("Max upload size: {} bytes", args.max_upload_bytes);
    info!("Metrics enabled: {}", args.enable_metrics);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    info!("Server listening on {}", args.bind);

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

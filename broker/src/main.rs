//! Speedmark Credential Broker
//!
//! Issues short-lived relay credentials for the packet-loss probe without
//! exposing the long-lived relay service secret.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use speedmark_broker::{AppState, app};
use speedmark_common::DEFAULT_TURN_TTL_SECS;
use speedmark_common::cors::AllowList;

#[derive(Parser, Debug)]
#[command(name = "speedmark-broker")]
#[command(version)]
#[command(about = "Speedmark credential broker - relay credentials for the packet-loss probe", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8787")]
    bind: String,

    /// Upstream relay credential API base URL
    #[arg(
        long,
        env = "TURN_API_URL",
        default_value = "https://rtc.live.cloudflare.com/v1/turn/keys"
    )]
    turn_api_url: String,

    /// Relay service token id
    #[arg(long, env = "TURN_TOKEN_ID")]
    turn_token_id: String,

    /// Relay service token secret
    #[arg(long, env = "TURN_TOKEN_SECRET")]
    turn_token_secret: String,

    /// TTL requested for issued credentials, in seconds
    #[arg(long, env = "TURN_TTL_SECONDS", default_value_t = DEFAULT_TURN_TTL_SECS)]
    turn_ttl_seconds: u64,

    /// Comma-separated allow-list of front-end origins ("*" for any)
    #[arg(long, env = "TURN_ORIGINS", default_value = "*")]
    cors_origins: String,
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

    info!("Starting Speedmark credential broker v{}", env!("CARGO_PKG_VERSION"));

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let state = AppState {
        allow_list: AllowList::parse(&args.cors_origins),
        upstream_base: args.turn_api_url,
        token_id: args.turn_token_id,
        token_secret: args.turn_token_secret,
        ttl_seconds: args.turn_ttl_seconds,
        http,
    };

    info!("Credential TTL: {} seconds", state.ttl_seconds);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    info!("Broker listening on {}", args.bind);

    axum::serve(listener, app(state))
        .await
        .context("Broker error")?;

    Ok(())
}

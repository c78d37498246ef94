//! Speedmark - Internet speed test client
//!
//! Drives a multi-phase measurement session against a Speedmark traffic
//! server and prints live progress, a final report, and a quality score.

mod config;
mod engine;
mod output;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use engine::http::HttpEngine;
use session::{Orchestrator, SessionState};

#[derive(Parser, Debug)]
#[command(name = "speedmark")]
#[command(version)]
#[command(about = "Internet speed test - throughput, latency, jitter, packet loss", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Traffic server base URL (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Credential broker URL for the packet-loss probe
    #[arg(long)]
    turn_url: Option<String>,

    /// Skip the packet-loss phase
    #[arg(long)]
    no_packet_loss: bool,

    /// Skip loaded-latency sampling during transfers
    #[arg(long)]
    no_loaded_latency: bool,

    /// Persist the effective settings to the config file and exit
    #[arg(long)]
    save: bool,

    /// Print a shareable summary after the test completes
    #[arg(long)]
    share: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = config::Config::load_or_default(&args.config);
    if let Some(server) = &args.server {
        config.server_base_url = server.clone();
    }
    if let Some(turn_url) = &args.turn_url {
        config.turn_credential_url = Some(turn_url.clone());
    }
    if args.no_packet_loss {
        config.enable_packet_loss = false;
    }
    if args.no_loaded_latency {
        config.enable_loaded_latency = false;
    }

    if args.save {
        config.save(&args.config)?;
        println!("Configuration saved to {:?}", args.config);
        return Ok(());
    }

    run_session(config, args.share).await
}

async fn run_session(config: config::Config, share: bool) -> Result<()> {
    let mut session = Orchestrator::new(config, |engine_config| {
        info!("starting measurement engine");
        HttpEngine::new(engine_config)
    });

    let Some(mut events) = session.start() else {
        if let SessionState::Errored { message } = session.state() {
            error!("{}", message);
            anyhow::bail!("{}", message.clone());
        }
        return Ok(());
    };

    output::progress(session.progress());

    let timeout = tokio::time::sleep(session::SESSION_TIMEOUT);
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // Engine hung up without a terminal signal.
                    break;
                };
                session.handle_event(event).await;
                output::progress(session.progress());
                if session.state().is_terminal() {
                    break;
                }
            }
            _ = &mut timeout => {
                session.on_timeout();
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                session.stop();
                output::progress(session.progress());
                break;
            }
        }
    }

    match session.state() {
        SessionState::Completed => {
            if let Some(report) = session.report() {
                output::final_report(report);
            }
            if let Some(started) = session.started_at() {
                let elapsed = chrono::Utc::now() - started;
                info!(
                    "session finished in {:.1}s",
                    elapsed.num_milliseconds() as f64 / 1000.0
                );
            }
            if share {
                if let Some(text) = session.share_text() {
                    println!("\n{text}");
                }
            }
            Ok(())
        }
        SessionState::Errored { message } => {
            error!("{}", message);
            anyhow::bail!("{}", message.clone())
        }
        _ => Ok(()),
    }
}

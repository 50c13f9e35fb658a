//! meshmap daemon - main entry point
//!
//! Polls an OpenThread border router, rebuilds the mesh topology, and serves
//! it over a REST API and WebSocket.

mod api;
mod config;
mod poller;
mod registry_file;
mod server;
mod state;
mod ws;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use meshmap_core::render::render_view;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::poller::CycleOutcome;

#[derive(Parser, Debug)]
#[command(name = "meshmap")]
#[command(about = "Thread mesh topology daemon for OpenThread border routers")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "meshmap.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Border router REST base URL, overrides [otbr] url
    #[arg(short, long)]
    otbr_url: Option<String>,

    /// Log level (trace, debug, info, warn, error), ignored when RUST_LOG is set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Poll on a schedule and serve the API (default)
    Serve,
    /// Run a single poll cycle and print the topology
    Once,
    /// Check that the border router answers
    Check,
}

fn init_logging(log_level: &str) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .init();
        return Ok(());
    }

    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("meshmap v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if let Some(url) = args.otbr_url {
        config.otbr.url = Some(url);
    }

    let state = state::AppState::new(config.clone())?;
    info!(
        otbr = %state.config.otbr_url()?,
        poll_secs = config.daemon.poll_interval_secs,
        "Configuration loaded"
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let shutdown = state.shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                    shutdown.cancel();
                }
            });
            server::run(state, &config.daemon.bind).await?;
        }
        Command::Once => match state.poller.run_once().await {
            CycleOutcome::Published(_) => print!("{}", render_view(&state.store.view())),
            CycleOutcome::Failed(failure) => bail!("Poll cycle failed: {}", failure.message),
            CycleOutcome::Skipped | CycleOutcome::Cancelled => {
                warn!("Poll cycle did not run");
            }
        },
        Command::Check => {
            let client = meshmap_otbr::OtbrClient::new(
                state.config.otbr_url()?,
                state.config.otbr_timeout(),
            )?;
            match client.probe().await? {
                Some(name) => println!("{} reachable, network \"{}\"", client.base_url(), name),
                None => println!("{} reachable, no network name reported", client.base_url()),
            }
        }
    }

    Ok(())
}

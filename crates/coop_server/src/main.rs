//! Co-op headless host

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coop_server::ServerConfig;

#[derive(Parser)]
#[command(name = "coop-server")]
#[command(about = "Headless host for co-op sessions", version)]
struct Cli {
    /// RON server config. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match cli.config {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "Bad server config");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(port = config.port, "Starting co-op host");
    match coop_server::run(config, cli.frames).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Host stopped");
            ExitCode::FAILURE
        }
    }
}

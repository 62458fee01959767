//! Co-op session development tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coop_tools::{packet, validate};

#[derive(Parser)]
#[command(name = "coop-tools")]
#[command(about = "Development tools for co-op sessions", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a hex packet and print it as JSON
    Decode {
        /// Packet bytes as hex
        hex: String,
        /// Input is a raw UDP datagram with a leading control byte
        #[arg(long)]
        datagram: bool,
    },
    /// Encode a JSON message and print it as hex
    Encode {
        /// Message JSON, as printed under `message` by decode
        json: String,
    },
    /// Load and validate a session config
    ValidateConfig {
        /// Path to a RON config
        path: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Decode { hex, datagram } => packet::decode_hex(&hex, datagram)
            .and_then(|decoded| packet::to_json(&decoded))
            .map(|json| println!("{json}")),
        Commands::Encode { json } => packet::encode_json(&json).map(|hex| println!("{hex}")),
        Commands::ValidateConfig { path } => {
            tracing::info!("Validating config: {}", path.display());
            validate::validate_config(&path).map(|config| {
                tracing::info!("Validation passed");
                println!("{}", validate::summary(&config));
            })
        }
    };

    if let Err(e) = outcome {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

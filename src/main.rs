//! Multi-chain trading agent
//!
//! # WARNING
//! - `start` runs against simulated collaborators only; no real trades are made.
//! - Newly listed tokens are extremely risky. Most go to zero.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use multichain_trader::cli::commands;
use multichain_trader::config::Config;
use multichain_trader::Chain;

/// Multi-chain trading agent
#[derive(Parser)]
#[command(name = "trader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs and engine events as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine with paper trading collaborators
    Start {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Show current configuration
    Config,

    /// Run the exit policy for a hypothetical position
    Evaluate {
        /// Chain whose thresholds apply (solana, ethereum, bsc)
        #[arg(long)]
        chain: Chain,

        /// Entry price
        #[arg(long)]
        entry: f64,

        /// Current price
        #[arg(long)]
        price: f64,

        /// Highest price seen since entry
        #[arg(long)]
        highest: Option<f64>,
    },
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("multichain_trader=info".parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { duration_secs } => commands::start(&config, duration_secs, cli.json).await,
        Commands::Config => commands::show_config(&config),
        Commands::Evaluate {
            chain,
            entry,
            price,
            highest,
        } => commands::evaluate(&config, chain, entry, price, highest),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

//! Delta Farmer - Main Entry Point
//!
//! Paper-trading CLI around the cycle controller: the `trade` command runs
//! the supervisory loop, `close` flattens every account and exits.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use delta_farmer::config::Config;
use delta_farmer::exchange::{AccountClient, MockAccountClient};
use delta_farmer::strategy::CycleController;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Delta Farmer CLI
#[derive(Parser)]
#[command(name = "delta-farmer")]
#[command(version, about = "Multi-account delta-neutral trade cycling")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "configs/delta-farmer.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run trade cycles until interrupted (default)
    Trade,
    /// Cancel all orders, close all positions, and exit
    Close,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load(&cli.config)?;
    let accounts = build_accounts(&config).await;
    info!(
        accounts = accounts.len(),
        markets = ?config.markets,
        "Delta farmer starting (paper mode)"
    );

    match cli.command.unwrap_or(Commands::Trade) {
        Commands::Trade => {
            let rng = StdRng::from_entropy();
            let mut controller = CycleController::new(config, accounts, rng);
            controller.run_trade().await
        }
        Commands::Close => {
            let (cancelled, closed) = CycleController::close_all(&accounts, None).await?;
            info!(cancelled, closed, "Close complete");
            Ok(())
        }
    }
}

/// Build paper-trading clients for every enabled account, with a synthetic
/// order book seeded for each configured market.
async fn build_accounts(config: &Config) -> Vec<Arc<dyn AccountClient>> {
    let mut accounts: Vec<Arc<dyn AccountClient>> = Vec::new();
    for acc in config.enabled_accounts() {
        let client = Arc::new(MockAccountClient::new(acc.name.clone(), acc.balance));
        for market in &config.markets {
            client
                .set_quote(market, dec!(99.99), dec!(100.01), dec!(0.001))
                .await;
        }
        accounts.push(client);
    }
    accounts
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    Ok(())
}

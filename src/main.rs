//! Polymarket Compounder — autonomous trading engine.
//!
//! Wires `Config` into the venue/catalog/oracle collaborators, builds the
//! core components (ledger, risk manager, order coordinator, journal), and
//! hands off to the `Scheduler`'s main loop until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use polymarket_compounder::catalog::{GammaMarketCatalog, MarketCatalog};
use polymarket_compounder::config::Config;
use polymarket_compounder::journal::Journal;
use polymarket_compounder::oracle::{HttpPriceOracle, PriceOracle};
use polymarket_compounder::order_coordinator::OrderCoordinator;
use polymarket_compounder::position_ledger::PositionLedger;
use polymarket_compounder::risk_manager::RiskManager;
use polymarket_compounder::scheduler::Scheduler;
use polymarket_compounder::telemetry;
use polymarket_compounder::venue::{ClobVenue, DryRunVenue, OrderVenue};

/// Autonomous Polymarket trading engine.
#[derive(Parser, Debug)]
#[command(name = "compounder", version, about)]
struct Cli {
    /// Force dry-run mode regardless of the DRY_RUN environment variable.
    #[arg(long)]
    dry_run: bool,

    /// Force live trading mode regardless of the DRY_RUN environment variable.
    #[arg(long, conflicts_with = "dry_run")]
    live: bool,

    /// Path to a `.env`-style config file to load before reading the environment.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Increase log verbosity (equivalent to RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        let _ = dotenvy::from_path(path);
    }

    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    telemetry::init_tracing();

    let mut config = Config::from_env();
    if cli.dry_run {
        config.dry_run = true;
    }
    if cli.live {
        config.dry_run = false;
    }

    if let Err(err) = run(config).await {
        error!(%err, "fatal startup failure");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let venue: Arc<dyn OrderVenue> = if config.dry_run {
        info!("🧪 running in dry-run mode, all fills are simulated");
        Arc::new(DryRunVenue::new(1000.0))
    } else {
        Arc::new(ClobVenue::new(config.clob_base_url.clone(), config.max_retries)?)
    };
    let catalog: Arc<dyn MarketCatalog> =
        Arc::new(GammaMarketCatalog::new(config.gamma_base_url.clone())?);
    let oracle: Arc<dyn PriceOracle> = Arc::new(HttpPriceOracle::new(
        "https://api.coingecko.com/api/v3",
        "https://api.binance.com",
    ));

    let ledger = Arc::new(PositionLedger::new());
    let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
    let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));
    let starting_balance = venue.get_balance().await.unwrap_or(0.0);
    let journal = Arc::new(Journal::new(config.journal_path.clone(), starting_balance));

    let scheduler = Scheduler::new(
        config, venue, catalog, oracle, coordinator, ledger, risk, journal,
    );
    let stop = scheduler.stop_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    scheduler.run().await
}

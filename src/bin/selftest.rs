//! Operational smoke-check: loads configuration, runs the venue self-test,
//! and exits 0/1 without entering the scheduler loop. Intended to be run
//! before a live deploy.

use polymarket_compounder::config::Config;
use polymarket_compounder::telemetry;
use polymarket_compounder::venue::{ClobVenue, DryRunVenue, OrderVenue};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    let config = Config::from_env();

    let venue: Box<dyn OrderVenue> = if config.dry_run {
        Box::new(DryRunVenue::new(1000.0))
    } else {
        match ClobVenue::new(config.clob_base_url.clone(), config.max_retries) {
            Ok(v) => Box::new(v),
            Err(err) => {
                tracing::error!(%err, "failed to construct clob venue");
                std::process::exit(1);
            }
        }
    };

    match venue.self_test().await {
        Ok(()) => {
            tracing::info!("✅ self-test passed");
            std::process::exit(0);
        }
        Err(err) => {
            tracing::error!(%err, "❌ self-test failed");
            std::process::exit(1);
        }
    }
}

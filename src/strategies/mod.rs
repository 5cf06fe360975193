//! The four trading strategies dispatched by the scheduler each cycle.

mod directional;
mod new_market_sniper;
mod resolution_arb;
mod sum_to_one;

pub use directional::DirectionalEngine;
pub use new_market_sniper::NewMarketSniper;
pub use resolution_arb::ResolutionArb;
pub use sum_to_one::SumToOneArb;

use anyhow::Result;
use async_trait::async_trait;

/// Common shape every strategy exposes to the scheduler. Each
/// implementation owns its own collaborators (catalog, venue,
/// coordinator, ledger, risk manager) rather than receiving them per call.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// One scan-and-trade pass. Errors are logged by the caller and never
    /// stop other strategies from running.
    async fn scan_and_execute(&self) -> Result<()>;

    /// Best-effort cleanup on shutdown; default is a no-op.
    async fn close(&self) {}
}

//! Main control loop: balance poll, phase selection, concurrent strategy
//! dispatch, periodic summaries, and graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::journal::Journal;
use crate::oracle::PriceOracle;
use crate::order_coordinator::OrderCoordinator;
use crate::phase::{determine_phase, CurrentPhase};
use crate::position_ledger::PositionLedger;
use crate::risk_manager::RiskManager;
use crate::strategies::{DirectionalEngine, NewMarketSniper, ResolutionArb, Strategy, SumToOneArb};
use crate::venue::OrderVenue;

/// Orchestrates balance polling, phase selection, and concurrent strategy
/// dispatch. Holds no trading logic of its own — every decision is
/// delegated to the risk manager and the active strategy set.
pub struct Scheduler {
    config: Config,
    venue: Arc<dyn OrderVenue>,
    catalog: Arc<dyn MarketCatalog>,
    oracle: Arc<dyn PriceOracle>,
    coordinator: Arc<OrderCoordinator>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    phase: Arc<CurrentPhase>,
    journal: Arc<Journal>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        venue: Arc<dyn OrderVenue>,
        catalog: Arc<dyn MarketCatalog>,
        oracle: Arc<dyn PriceOracle>,
        coordinator: Arc<OrderCoordinator>,
        ledger: Arc<PositionLedger>,
        risk: Arc<RiskManager>,
        journal: Arc<Journal>,
    ) -> Self {
        Self {
            config,
            venue,
            catalog,
            oracle,
            coordinator,
            ledger,
            risk,
            phase: Arc::new(CurrentPhase::new(1)),
            journal,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shared handle the caller can flip from a signal handler to request
    /// a graceful stop after the in-flight cycle completes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn build_strategies(&self, phase: u8) -> Vec<Arc<dyn Strategy>> {
        let mut strategies: Vec<Arc<dyn Strategy>> = vec![Arc::new(SumToOneArb::new(
            self.catalog.clone(),
            self.venue.clone(),
            self.coordinator.clone(),
            self.ledger.clone(),
            self.risk.clone(),
            self.phase.clone(),
            self.journal.clone(),
            self.config.clone(),
        ))];

        if phase >= 1 {
            strategies.push(Arc::new(ResolutionArb::new(
                self.catalog.clone(),
                self.venue.clone(),
                self.oracle.clone(),
                self.coordinator.clone(),
                self.ledger.clone(),
                self.risk.clone(),
                self.phase.clone(),
                self.journal.clone(),
                self.config.clone(),
            )));
        }
        if phase >= 2 {
            strategies.push(Arc::new(NewMarketSniper::new(
                self.catalog.clone(),
                self.venue.clone(),
                self.coordinator.clone(),
                self.ledger.clone(),
                self.risk.clone(),
                self.phase.clone(),
                self.journal.clone(),
                self.config.clone(),
            )));
        }
        if phase >= 3 {
            strategies.push(Arc::new(DirectionalEngine::new(
                self.catalog.clone(),
                self.venue.clone(),
                self.oracle.clone(),
                self.coordinator.clone(),
                self.ledger.clone(),
                self.risk.clone(),
                self.phase.clone(),
                self.journal.clone(),
                self.config.clone(),
            )));
        }
        strategies
    }

    /// Runs startup, then the main loop, until the stop flag is observed.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.startup().await?;

        let mut strategies = self.build_strategies(self.phase.get());
        let mut interval = tokio::time::interval(self.config.scan_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut cycle: u64 = 0;

        loop {
            interval.tick().await;
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            match self.run_cycle(&strategies).await {
                Ok(new_phase) => {
                    if new_phase != self.phase.get() {
                        info!(
                            from = self.phase.get(),
                            to = new_phase,
                            "active phase changed, rebuilding strategy set"
                        );
                        self.phase.set(new_phase);
                        strategies = self.build_strategies(new_phase);
                    }
                }
                Err(err) => {
                    error!(%err, "cycle failed outside any single strategy, backing off");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }

            cycle += 1;
            if self.config.summary_every_cycles > 0 && cycle % self.config.summary_every_cycles == 0
            {
                self.emit_summary_if_due().await;
            }
        }

        self.shutdown(&strategies).await;
        Ok(())
    }

    async fn startup(&self) -> anyhow::Result<()> {
        if let Err(err) = self.venue.self_test().await {
            error!(%err, "venue self-test failed");
            return Err(err);
        }

        let balance = self.venue.get_balance().await?;
        if !self.config.dry_run && balance < self.config.min_starting_balance_usd {
            anyhow::bail!(
                "starting balance {balance:.2} below minimum {:.2} required for live trading",
                self.config.min_starting_balance_usd
            );
        }

        self.risk.set_day_start_balance(balance);
        let phase = determine_phase(
            balance,
            self.config.active_phase_override,
            self.config.phase2_threshold,
            self.config.phase3_threshold,
        );
        self.phase.set(phase);
        info!(
            balance,
            phase,
            dry_run = self.config.dry_run,
            "🤖 scheduler starting up"
        );
        Ok(())
    }

    /// Polls balance, derives phase, skips the cycle under cooldown, and
    /// dispatches all active strategies concurrently. Returns the phase
    /// that should be active for the *next* cycle.
    async fn run_cycle(&self, strategies: &[Arc<dyn Strategy>]) -> anyhow::Result<u8> {
        let balance = self.venue.get_balance().await?;
        self.risk.roll_day_if_needed(balance);

        let phase = determine_phase(
            balance,
            self.config.active_phase_override,
            self.config.phase2_threshold,
            self.config.phase3_threshold,
        );

        if !self.risk.is_trading_allowed() {
            info!("cycle skipped: trading not allowed (cooldown active)");
            return Ok(phase);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for strategy in strategies {
            let strategy = strategy.clone();
            tasks.spawn(async move {
                let name = strategy.name();
                if let Err(err) = strategy.scan_and_execute().await {
                    warn!(strategy = name, %err, "strategy cycle failed, continuing with others");
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        Ok(phase)
    }

    async fn emit_summary_if_due(&self) {
        let balance = self.venue.get_balance().await.unwrap_or(0.0);
        self.journal
            .check_daily_summary(&self.ledger.trade_history(), balance);
    }

    async fn shutdown(&self, strategies: &[Arc<dyn Strategy>]) {
        info!("🛑 shutdown signal observed, finishing in-flight work");
        if let Err(err) = self.coordinator.cancel_all().await {
            warn!(%err, "failed to cancel open orders during shutdown");
        }
        for strategy in strategies {
            strategy.close().await;
        }
        let balance = self.venue.get_balance().await.unwrap_or(0.0);
        info!(
            balance,
            trades = self.ledger.trade_history().len(),
            "📊 final summary, shutdown complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_analyzer::{OrderBookSide, PriceLevel};
    use crate::catalog::StaticCatalog;
    use crate::market::{Market, Token};
    use crate::oracle::FixedPriceOracle;
    use crate::venue::DryRunVenue;

    fn market() -> Market {
        Market {
            condition_id: "c1".to_string(),
            question: "Will it happen?".to_string(),
            active: true,
            closed: false,
            enable_order_book: true,
            volume_usd: 5000.0,
            created_at: chrono::Utc::now(),
            end_date: chrono::Utc::now() + chrono::Duration::days(7),
            tokens: vec![
                Token { token_id: "yes".into(), outcome: "Yes".into() },
                Token { token_id: "no".into(), outcome: "No".into() },
            ],
        }
    }

    fn scheduler(balance: f64) -> Scheduler {
        let venue = Arc::new(DryRunVenue::new(balance));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.55, size: 100.0 }]),
            OrderBookSide::default(),
        );
        venue.seed_book(
            "no",
            OrderBookSide::new(vec![PriceLevel { price: 0.55, size: 100.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![market()]));
        let oracle: Arc<dyn PriceOracle> = Arc::new(FixedPriceOracle::default());
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));
        let journal = Arc::new(Journal::new("/tmp/scheduler-test-journal.csv", balance));

        Scheduler::new(config, venue, catalog, oracle, coordinator, ledger, risk, journal)
    }

    #[tokio::test]
    async fn startup_sets_phase_from_balance() {
        let s = scheduler(600.0);
        s.startup().await.unwrap();
        assert_eq!(s.phase.get(), 3);
    }

    #[tokio::test]
    async fn run_cycle_skips_when_cooldown_active() {
        let s = scheduler(100.0);
        s.startup().await.unwrap();
        s.risk.set_day_start_balance(1000.0);
        // Force cooldown via repeated drawdown check.
        let request = crate::risk_manager::TradeRequest {
            strategy: "x".to_string(),
            size_usd: 0.0,
            max_loss_usd: 0.0,
        };
        s.risk.check_trade(100.0, &request);
        assert!(!s.risk.is_trading_allowed());

        let strategies = s.build_strategies(1);
        let phase = s.run_cycle(&strategies).await.unwrap();
        assert_eq!(phase, 1);
        assert!(s.ledger.trade_history().is_empty());
    }

    #[tokio::test]
    async fn build_strategies_grows_with_phase() {
        let s = scheduler(1000.0);
        assert_eq!(s.build_strategies(1).len(), 2);
        assert_eq!(s.build_strategies(2).len(), 3);
        assert_eq!(s.build_strategies(3).len(), 4);
    }
}

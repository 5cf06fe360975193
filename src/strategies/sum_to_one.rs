//! Naive-sum arbitrage: buy YES and NO together whenever their combined
//! ask price is comfortably below $1, locking in a risk-free spread.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::book_analyzer;
use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::journal::Journal;
use crate::order_coordinator::{OrderCoordinator, PairOutcome};
use crate::phase::CurrentPhase;
use crate::position_ledger::{Position, PositionLedger};
use crate::risk_manager::{RiskManager, TradeRequest};
use crate::venue::OrderVenue;

use super::Strategy;

pub struct SumToOneArb {
    catalog: Arc<dyn MarketCatalog>,
    venue: Arc<dyn OrderVenue>,
    coordinator: Arc<OrderCoordinator>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    phase: Arc<CurrentPhase>,
    journal: Arc<Journal>,
    config: Config,
}

impl SumToOneArb {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn MarketCatalog>,
        venue: Arc<dyn OrderVenue>,
        coordinator: Arc<OrderCoordinator>,
        ledger: Arc<PositionLedger>,
        risk: Arc<RiskManager>,
        phase: Arc<CurrentPhase>,
        journal: Arc<Journal>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            venue,
            coordinator,
            ledger,
            risk,
            phase,
            journal,
            config,
        }
    }

    async fn evaluate_market(&self, market: &crate::market::Market, balance: f64) -> Result<()> {
        let (Some(yes_id), Some(no_id)) = (market.yes_token_id(), market.no_token_id()) else {
            return Ok(());
        };

        let (yes_asks, _yes_bids) = self.venue.get_order_book(yes_id).await?;
        let (no_asks, _no_bids) = self.venue.get_order_book(no_id).await?;

        let yes_best = book_analyzer::best_ask_price(&yes_asks);
        let no_best = book_analyzer::best_ask_price(&no_asks);
        let (Some(yes_best), Some(no_best)) = (yes_best, no_best) else {
            return Ok(());
        };

        let naive_sum = yes_best + no_best;
        if naive_sum > self.config.arb_threshold {
            return Ok(());
        }

        let size_usd = (self.config.max_position_pct * balance)
            .min(self.config.max_trade_usd)
            * self.risk.position_multiplier();
        let estimated_shares = size_usd / naive_sum;

        let Some(combined_cost) =
            book_analyzer::combined_fill_cost(&yes_asks, &no_asks, estimated_shares)
        else {
            return Ok(());
        };

        let per_share_cost = combined_cost / estimated_shares;
        let profit_per_share =
            1.0 - per_share_cost - per_share_cost * self.config.estimated_fee_rate;
        if profit_per_share < self.config.min_arb_profit_pct {
            return Ok(());
        }

        let request = TradeRequest {
            strategy: self.name().to_string(),
            size_usd: combined_cost,
            max_loss_usd: combined_cost * self.config.slippage_buffer,
        };
        let (approved, reason) = self.risk.check_trade(balance, &request);
        if !approved {
            info!(market = %market.question, reason, "sum-to-one arb trade rejected");
            return Ok(());
        }

        let pair = self
            .coordinator
            .place_arb_pair(yes_id, yes_best, no_id, no_best, estimated_shares)
            .await?;

        let outcome = self.coordinator.monitor_arb_fills(&pair).await?;
        match &outcome {
            PairOutcome::BothFilled => {}
            PairOutcome::UnrecoveredResidual { leg, entry_price, size } => {
                let (token_id, side) = match leg {
                    crate::order_coordinator::PairLeg::Yes => (yes_id, "YES"),
                    crate::order_coordinator::PairLeg::No => (no_id, "NO"),
                };
                warn!(
                    market = %market.question,
                    token_id,
                    side,
                    "sum-to-one arb leg left as unrecovered residual position"
                );
                self.ledger.open_position(Position {
                    token_id: token_id.to_string(),
                    strategy: self.name().to_string(),
                    market_name: market.question.clone(),
                    side: side.to_string(),
                    entry_price: *entry_price,
                    size_usd: entry_price * size,
                    shares: *size,
                    opened_at: chrono::Utc::now(),
                });
                return Ok(());
            }
            PairOutcome::RecoveredNoResidual { .. } | PairOutcome::NeitherFilled => {
                info!(market = %market.question, ?outcome, "sum-to-one arb pair did not fully fill");
                return Ok(());
            }
        }

        self.ledger.open_position(Position {
            token_id: yes_id.to_string(),
            strategy: self.name().to_string(),
            market_name: market.question.clone(),
            side: "YES".to_string(),
            entry_price: yes_best,
            size_usd: yes_best * estimated_shares,
            shares: estimated_shares,
            opened_at: chrono::Utc::now(),
        });
        self.ledger.open_position(Position {
            token_id: no_id.to_string(),
            strategy: self.name().to_string(),
            market_name: market.question.clone(),
            side: "NO".to_string(),
            entry_price: no_best,
            size_usd: no_best * estimated_shares,
            shares: estimated_shares,
            opened_at: chrono::Utc::now(),
        });

        // The combined position's resolution value is guaranteed (exactly
        // one leg always pays $1, the other $0), so the arbitrage is
        // realized immediately rather than waiting for market settlement.
        let phase = self.phase.get();
        let new_balance = balance - combined_cost + estimated_shares;
        self.ledger.close_position(no_id, 0.0, new_balance, phase);
        if let Some(record) = self
            .ledger
            .close_position(yes_id, 1.0, new_balance, phase)
        {
            info!(market = %market.question, pnl = record.pnl_usd, "sum-to-one arb realized");
            if let Err(err) = self.journal.record(&record) {
                warn!(%err, "failed to append trade to journal");
            }
        }
        self.risk.record_trade_completed(true);

        Ok(())
    }
}

#[async_trait]
impl Strategy for SumToOneArb {
    fn name(&self) -> &'static str {
        "sum_to_one_arb"
    }

    async fn scan_and_execute(&self) -> Result<()> {
        let balance = self.venue.get_balance().await?;
        let markets = self
            .catalog
            .tradable_markets(self.config.min_market_volume_usd)
            .await?;

        for market in markets {
            if let Err(err) = self.evaluate_market(&market, balance).await {
                warn!(market = %market.question, %err, "sum-to-one arb evaluation failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_analyzer::{OrderBookSide, PriceLevel};
    use crate::catalog::StaticCatalog;
    use crate::market::{Market, Token};
    use crate::venue::DryRunVenue;

    fn test_journal() -> Arc<Journal> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        std::mem::forget(dir);
        Arc::new(Journal::new(path, 1000.0))
    }

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

    #[tokio::test]
    async fn realizes_profitable_naive_sum_arb() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.48, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        venue.seed_book(
            "no",
            OrderBookSide::new(vec![PriceLevel { price: 0.48, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![market()]));
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        risk.set_day_start_balance(1000.0);
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = SumToOneArb::new(catalog, venue, coordinator, ledger.clone(), risk, Arc::new(crate::phase::CurrentPhase::new(1)), test_journal(), config);
        strategy.scan_and_execute().await.unwrap();

        assert!(ledger.open_positions().is_empty());
        assert_eq!(ledger.trade_history().len(), 1);
    }

    #[tokio::test]
    async fn skips_market_above_arb_threshold() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.52, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        venue.seed_book(
            "no",
            OrderBookSide::new(vec![PriceLevel { price: 0.52, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![market()]));
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = SumToOneArb::new(catalog, venue, coordinator, ledger.clone(), risk, Arc::new(crate::phase::CurrentPhase::new(1)), test_journal(), config);
        strategy.scan_and_execute().await.unwrap();

        assert!(ledger.trade_history().is_empty());
    }
}

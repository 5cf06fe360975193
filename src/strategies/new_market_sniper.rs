//! New-market sniper: takes an early position in freshly listed binary
//! markets, sized by how confidently the naive sum classifies the market.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::book_analyzer;
use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::journal::Journal;
use crate::market::Market;
use crate::order_coordinator::{OrderCoordinator, PairLeg, PairOutcome};
use crate::phase::CurrentPhase;
use crate::position_ledger::{Position, PositionLedger};
use crate::risk_manager::{RiskManager, TradeRequest};
use crate::venue::OrderVenue;

use super::Strategy;

enum Classification {
    High,
    Standard,
}

pub struct NewMarketSniper {
    catalog: Arc<dyn MarketCatalog>,
    venue: Arc<dyn OrderVenue>,
    coordinator: Arc<OrderCoordinator>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    phase: Arc<CurrentPhase>,
    journal: Arc<Journal>,
    config: Config,
}

impl NewMarketSniper {
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

    /// `<= highPriorityThreshold` is High confidence (full size), the band
    /// up to `arbThreshold` is Standard (half size), anything above is
    /// skipped as too far from a guaranteed settlement.
    fn classify(&self, naive_sum: f64) -> Option<Classification> {
        if naive_sum <= self.config.high_priority_threshold {
            Some(Classification::High)
        } else if naive_sum <= self.config.arb_threshold {
            Some(Classification::Standard)
        } else {
            None
        }
    }

    async fn try_enter(&self, market: &Market, balance: f64, size_usd: f64) -> Result<bool> {
        let (Some(yes_id), Some(no_id)) = (market.yes_token_id(), market.no_token_id()) else {
            return Ok(false);
        };

        let (yes_asks, _) = self.venue.get_order_book(yes_id).await?;
        let (no_asks, _) = self.venue.get_order_book(no_id).await?;
        let (Some(yes_price), Some(no_price)) = (
            book_analyzer::best_ask_price(&yes_asks),
            book_analyzer::best_ask_price(&no_asks),
        ) else {
            return Ok(false);
        };

        let shares = size_usd / (yes_price + no_price);
        let Some(combined_cost) =
            book_analyzer::combined_fill_cost(&yes_asks, &no_asks, shares)
        else {
            return Ok(false);
        };

        let request = TradeRequest {
            strategy: self.name().to_string(),
            size_usd: combined_cost,
            max_loss_usd: combined_cost,
        };
        let (approved, reason) = self.risk.check_trade(balance, &request);
        if !approved {
            info!(market = %market.question, reason, "new market sniper trade rejected");
            return Ok(false);
        }

        let pair = self
            .coordinator
            .place_arb_pair(yes_id, yes_price, no_id, no_price, shares)
            .await?;
        let outcome = self.coordinator.monitor_arb_fills(&pair).await?;

        match outcome {
            PairOutcome::BothFilled => {
                self.ledger.open_position(Position {
                    token_id: yes_id.to_string(),
                    strategy: self.name().to_string(),
                    market_name: market.question.clone(),
                    side: "YES".to_string(),
                    entry_price: yes_price,
                    size_usd: yes_price * shares,
                    shares,
                    opened_at: chrono::Utc::now(),
                });
                self.ledger.open_position(Position {
                    token_id: no_id.to_string(),
                    strategy: self.name().to_string(),
                    market_name: market.question.clone(),
                    side: "NO".to_string(),
                    entry_price: no_price,
                    size_usd: no_price * shares,
                    shares,
                    opened_at: chrono::Utc::now(),
                });
                let phase = self.phase.get();
                let new_balance = balance - combined_cost + shares;
                self.ledger.close_position(no_id, 0.0, new_balance, phase);
                if let Some(record) = self.ledger.close_position(yes_id, 1.0, new_balance, phase) {
                    info!(market = %market.question, pnl = record.pnl_usd, "new market sniper realized");
                    if let Err(err) = self.journal.record(&record) {
                        warn!(%err, "failed to append trade to journal");
                    }
                }
                self.risk.record_trade_completed(true);
                Ok(true)
            }
            PairOutcome::UnrecoveredResidual { leg, entry_price, size } => {
                let (token_id, side) = match leg {
                    PairLeg::Yes => (yes_id, "YES"),
                    PairLeg::No => (no_id, "NO"),
                };
                warn!(market = %market.question, token_id, side, "new market sniper leg left as unrecovered residual");
                self.ledger.open_position(Position {
                    token_id: token_id.to_string(),
                    strategy: self.name().to_string(),
                    market_name: market.question.clone(),
                    side: side.to_string(),
                    entry_price,
                    size_usd: entry_price * size,
                    shares: size,
                    opened_at: chrono::Utc::now(),
                });
                Ok(true)
            }
            PairOutcome::RecoveredNoResidual { .. } | PairOutcome::NeitherFilled => Ok(false),
        }
    }

    async fn evaluate_market(&self, market: &Market, balance: f64) -> Result<()> {
        if self.ledger.strategy_exposure(self.name()) + self.config.min_trade_usd
            > self.config.max_new_market_exposure_pct * balance
        {
            return Ok(());
        }

        let (Some(yes_id), Some(no_id)) = (market.yes_token_id(), market.no_token_id()) else {
            return Ok(());
        };
        let (yes_asks, _) = self.venue.get_order_book(yes_id).await?;
        let (no_asks, _) = self.venue.get_order_book(no_id).await?;
        let (Some(yes_price), Some(no_price)) = (
            book_analyzer::best_ask_price(&yes_asks),
            book_analyzer::best_ask_price(&no_asks),
        ) else {
            return Ok(());
        };
        let naive_sum = yes_price + no_price;

        let Some(classification) = self.classify(naive_sum) else {
            return Ok(());
        };

        let base_size = (self.config.new_market_size_pct * balance)
            .min(self.config.max_trade_usd)
            * self.risk.position_multiplier();
        let size_usd = match classification {
            Classification::High => base_size,
            Classification::Standard => base_size * 0.5,
        };

        if !self.try_enter(market, balance, size_usd).await? {
            // Retry once at half size in case the top-of-book depth was
            // too thin for the full size.
            self.try_enter(market, balance, size_usd / 2.0).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Strategy for NewMarketSniper {
    fn name(&self) -> &'static str {
        "new_market_sniper"
    }

    async fn scan_and_execute(&self) -> Result<()> {
        let balance = self.venue.get_balance().await?;
        let new_markets = self
            .catalog
            .new_markets(self.config.new_market_age_limit_secs)
            .await?;

        for market in new_markets {
            if !market.is_tradable(self.config.min_market_volume_usd) {
                continue;
            }
            if let Err(err) = self.evaluate_market(&market, balance).await {
                warn!(market = %market.question, %err, "new market sniper evaluation failed");
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
    use crate::market::Token;
    use crate::venue::DryRunVenue;

    fn test_journal() -> Arc<Journal> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        std::mem::forget(dir);
        Arc::new(Journal::new(path, 1000.0))
    }

    fn fresh_market() -> Market {
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
    async fn enters_high_confidence_new_market() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.45, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        venue.seed_book(
            "no",
            OrderBookSide::new(vec![PriceLevel { price: 0.45, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![fresh_market()]));
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        risk.set_day_start_balance(1000.0);
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = NewMarketSniper::new(
            catalog,
            venue,
            coordinator,
            ledger.clone(),
            risk,
            Arc::new(crate::phase::CurrentPhase::new(1)),
            test_journal(),
            config,
        );
        strategy.scan_and_execute().await.unwrap();

        assert_eq!(ledger.trade_history().len(), 1);
        assert!(ledger.open_positions().is_empty());
    }

    #[tokio::test]
    async fn skips_market_classified_too_far_from_one() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.70, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        venue.seed_book(
            "no",
            OrderBookSide::new(vec![PriceLevel { price: 0.70, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![fresh_market()]));
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = NewMarketSniper::new(
            catalog,
            venue,
            coordinator,
            ledger.clone(),
            risk,
            Arc::new(crate::phase::CurrentPhase::new(1)),
            test_journal(),
            config,
        );
        strategy.scan_and_execute().await.unwrap();

        assert!(ledger.open_positions().is_empty());
    }
}

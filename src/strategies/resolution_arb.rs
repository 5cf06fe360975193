//! Resolution arbitrage: once an external price source makes a threshold
//! market's outcome effectively certain, buy the winning token before the
//! order book catches up.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::book_analyzer;
use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::journal::Journal;
use crate::market::Market;
use crate::markets::{parse_strike_question, Direction};
use crate::oracle::PriceOracle;
use crate::order_coordinator::OrderCoordinator;
use crate::phase::CurrentPhase;
use crate::position_ledger::{Position, PositionLedger};
use crate::risk_manager::{RiskManager, TradeRequest};
use crate::venue::{OrderVenue, Side};

use super::Strategy;

pub struct ResolutionArb {
    catalog: Arc<dyn MarketCatalog>,
    venue: Arc<dyn OrderVenue>,
    oracle: Arc<dyn PriceOracle>,
    coordinator: Arc<OrderCoordinator>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    phase: Arc<CurrentPhase>,
    journal: Arc<Journal>,
    config: Config,
}

impl ResolutionArb {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn MarketCatalog>,
        venue: Arc<dyn OrderVenue>,
        oracle: Arc<dyn PriceOracle>,
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
            oracle,
            coordinator,
            ledger,
            risk,
            phase,
            journal,
            config,
        }
    }

    fn matching_asset(&self, question: &str) -> Option<String> {
        let lower = question.to_lowercase();
        self.config
            .resolution_asset_keywords
            .iter()
            .find(|kw| lower.contains(kw.as_str()))
            .cloned()
    }

    async fn evaluate_market(&self, market: &Market, balance: f64) -> Result<()> {
        let Some(asset) = self.matching_asset(&market.question) else {
            return Ok(());
        };
        let Some(parsed) = parse_strike_question(&market.question) else {
            return Ok(());
        };
        let (Some(yes_id), Some(no_id)) = (market.yes_token_id(), market.no_token_id()) else {
            return Ok(());
        };

        let confirmed_price = match self
            .oracle
            .confirmed_price(&asset, self.config.price_agreement_tolerance_pct)
            .await
        {
            Ok(price) => price,
            Err(err) => {
                warn!(market = %market.question, %err, "price sources disagree, skipping");
                return Ok(());
            }
        };

        // If price sits within the buffer of the strike, the outcome isn't
        // unambiguous yet — skip until it clears the band decisively.
        let distance_pct = (confirmed_price - parsed.strike).abs() / parsed.strike;
        if distance_pct < self.config.price_buffer_pct {
            return Ok(());
        }

        let yes_wins = match parsed.direction {
            Direction::Above => confirmed_price > parsed.strike,
            Direction::Below => confirmed_price < parsed.strike,
        };
        let winning_token = if yes_wins { yes_id } else { no_id };

        let (asks, _bids) = self.venue.get_order_book(winning_token).await?;
        let Some(ask_price) = book_analyzer::best_ask_price(&asks) else {
            return Ok(());
        };

        if ask_price > 0.97 {
            return Ok(());
        }
        let edge = 1.0 - ask_price;
        if edge < self.config.min_resolution_edge {
            return Ok(());
        }

        let size_usd = (self.config.max_resolution_position_pct * balance)
            .min(self.config.max_trade_usd)
            * self.risk.position_multiplier();
        let shares = size_usd / ask_price;

        let est = book_analyzer::walk_asks(&asks, shares);
        if !est.fully_fillable {
            return Ok(());
        }

        let request = TradeRequest {
            strategy: self.name().to_string(),
            size_usd: est.total_cost,
            max_loss_usd: est.total_cost * 0.05,
        };
        let (approved, reason) = self.risk.check_trade(balance, &request);
        if !approved {
            info!(market = %market.question, reason, "resolution arb trade rejected");
            return Ok(());
        }

        let ticket = self
            .coordinator
            .place_limit(winning_token, Side::Buy, ask_price, shares)
            .await?;
        if !self.coordinator.wait_for_fill(&ticket).await? {
            info!(market = %market.question, "resolution arb order did not fill");
            return Ok(());
        }

        self.ledger.open_position(Position {
            token_id: winning_token.to_string(),
            strategy: self.name().to_string(),
            market_name: market.question.clone(),
            side: if yes_wins { "YES".to_string() } else { "NO".to_string() },
            entry_price: ask_price,
            size_usd: ask_price * shares,
            shares,
            opened_at: chrono::Utc::now(),
        });

        // The winning token is already known but the market itself hasn't
        // settled yet, so in live mode the position stays open on the books
        // until real resolution. Dry-run simulates that payout immediately
        // so backtests and paper-trading runs produce a trade record.
        if self.config.dry_run {
            let phase = self.phase.get();
            let new_balance = balance - est.total_cost + shares;
            if let Some(record) = self.ledger.close_position(winning_token, 1.0, new_balance, phase) {
                info!(market = %market.question, pnl = record.pnl_usd, "[dry run] resolution arb realized");
                if let Err(err) = self.journal.record(&record) {
                    warn!(%err, "failed to append trade to journal");
                }
            }
            self.risk.record_trade_completed(true);
        } else {
            info!(market = %market.question, token_id = winning_token, "resolution arb position opened, awaiting market resolution");
        }

        Ok(())
    }
}

#[async_trait]
impl Strategy for ResolutionArb {
    fn name(&self) -> &'static str {
        "resolution_arb"
    }

    async fn scan_and_execute(&self) -> Result<()> {
        let balance = self.venue.get_balance().await?;
        let markets = self
            .catalog
            .tradable_markets(self.config.min_market_volume_usd)
            .await?;

        for market in markets {
            if let Err(err) = self.evaluate_market(&market, balance).await {
                warn!(market = %market.question, %err, "resolution arb evaluation failed");
            }
        }
        Ok(())
    }
}

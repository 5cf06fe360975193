//! Directional engine: volatility-informed directional bets on BTC threshold
//! markets, sized by half-Kelly and auto-disabled on a sustained losing
//! streak. Only active once the account has compounded into Phase 3.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::book_analyzer;
use crate::catalog::MarketCatalog;
use crate::config::Config;
use crate::journal::Journal;
use crate::markets::{normal_cdf, parse_strike_question, Direction};
use crate::oracle::PriceOracle;
use crate::order_coordinator::OrderCoordinator;
use crate::phase::CurrentPhase;
use crate::position_ledger::{Position, PositionLedger};
use crate::risk_manager::{RiskManager, TradeRequest};
use crate::venue::{OrderVenue, Side};

use super::Strategy;

const VOL_CACHE_TTL: StdDuration = StdDuration::from_secs(300);
const ASSET: &str = "btc";

#[derive(Clone, Copy)]
struct VolSnapshot {
    fetched_at: std::time::Instant,
    price: f64,
    hourly_vol: f64,
}

/// Realized 1-minute log-return volatility, scaled to an hourly figure and
/// cached for five minutes to avoid hammering the price oracle every cycle.
struct VolCache {
    snapshot: Mutex<Option<VolSnapshot>>,
}

impl VolCache {
    fn new() -> Self {
        Self { snapshot: Mutex::new(None) }
    }

    async fn get(&self, oracle: &dyn PriceOracle) -> Option<(f64, f64)> {
        {
            let cached = self.snapshot.lock();
            if let Some(s) = *cached {
                if s.fetched_at.elapsed() < VOL_CACHE_TTL {
                    return Some((s.price, s.hourly_vol));
                }
            }
        }

        let closes = oracle.recent_closes_1m(ASSET).await.ok()?;
        if closes.len() < 60 {
            return None;
        }

        let mut log_returns = Vec::with_capacity(closes.len() - 1);
        for window in closes.windows(2) {
            if window[0] > 0.0 {
                log_returns.push((window[1] / window[0]).ln());
            }
        }
        if log_returns.len() < 30 {
            return None;
        }

        let mean = log_returns.iter().sum::<f64>() / log_returns.len() as f64;
        let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / log_returns.len() as f64;
        let std_1min = variance.sqrt();
        let hourly_vol = std_1min * 60f64.sqrt();
        let price = *closes.last()?;

        *self.snapshot.lock() = Some(VolSnapshot {
            fetched_at: std::time::Instant::now(),
            price,
            hourly_vol,
        });
        debug!(price, hourly_vol, "refreshed directional volatility snapshot");
        Some((price, hourly_vol))
    }
}

pub struct DirectionalEngine {
    catalog: Arc<dyn MarketCatalog>,
    venue: Arc<dyn OrderVenue>,
    oracle: Arc<dyn PriceOracle>,
    coordinator: Arc<OrderCoordinator>,
    ledger: Arc<PositionLedger>,
    risk: Arc<RiskManager>,
    phase: Arc<CurrentPhase>,
    journal: Arc<Journal>,
    config: Config,
    disabled: AtomicBool,
    vol_cache: VolCache,
}

impl DirectionalEngine {
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
            disabled: AtomicBool::new(false),
            vol_cache: VolCache::new(),
        }
    }

    /// Once win rate over the trailing sample drops below the configured
    /// floor, the engine disables itself permanently for the process
    /// lifetime. Re-enabling requires a restart with the config reviewed.
    fn check_auto_disable(&self) {
        let history = self.ledger.strategy_trade_history(self.name());
        if history.len() < self.config.directional_min_sample as usize {
            return;
        }
        if let Some(win_rate) = self.ledger.strategy_win_rate(self.name()) {
            if win_rate < self.config.directional_min_win_rate {
                self.disabled.store(true, Ordering::Relaxed);
                warn!(
                    win_rate = win_rate * 100.0,
                    floor = self.config.directional_min_win_rate * 100.0,
                    trades = history.len(),
                    "directional engine auto-disabled: win rate below floor"
                );
            }
        }
    }

    async fn evaluate_market(
        &self,
        market: &crate::market::Market,
        btc_price: f64,
        hourly_vol: f64,
        balance: f64,
    ) -> Result<bool> {
        let Some(parsed) = parse_strike_question(&market.question) else {
            return Ok(false);
        };

        let hours_to_resolve = market.hours_to_resolve(chrono::Utc::now());
        if hours_to_resolve <= 0.0 || hours_to_resolve > 24.0 {
            return Ok(false);
        }
        if btc_price <= 0.0 || hourly_vol <= 0.0 {
            return Ok(false);
        }

        let scaled_vol = hourly_vol * hours_to_resolve.sqrt();
        let z_score = (parsed.strike / btc_price).ln() / scaled_vol;
        let model_prob_above = 1.0 - normal_cdf(z_score);

        let (Some(yes_id), Some(no_id)) = (market.yes_token_id(), market.no_token_id()) else {
            return Ok(false);
        };

        let (yes_asks, _) = self.venue.get_order_book(yes_id).await?;
        let Some(yes_best) = book_analyzer::best_ask_price(&yes_asks) else {
            return Ok(false);
        };
        let implied_prob = yes_best;

        let model_prob = match parsed.direction {
            Direction::Above => model_prob_above,
            Direction::Below => 1.0 - model_prob_above,
        };
        let raw_edge = model_prob - implied_prob;
        if raw_edge.abs() < self.config.min_edge_directional {
            return Ok(false);
        }

        let (buy_token, buy_side, buy_price, buy_asks, edge) = if raw_edge > 0.0 {
            (yes_id, "YES", yes_best, yes_asks, raw_edge)
        } else {
            let (no_asks, _) = self.venue.get_order_book(no_id).await?;
            let Some(no_best) = book_analyzer::best_ask_price(&no_asks) else {
                return Ok(false);
            };
            (no_id, "NO", no_best, no_asks, -raw_edge)
        };

        info!(
            market = %market.question,
            model_prob = model_prob * 100.0,
            implied_prob = implied_prob * 100.0,
            edge = edge * 100.0,
            side = buy_side,
            "directional edge detected"
        );

        let odds = if buy_price > 0.0 { 1.0 / buy_price - 1.0 } else { 0.0 };
        let full_kelly = if odds > 0.0 { edge / odds } else { 0.0 };
        let size_pct = (full_kelly * self.config.kelly_fraction)
            .min(self.config.max_directional_position_pct);
        let size_usd = balance * size_pct * self.risk.position_multiplier();

        let dir_exposure = self.ledger.strategy_exposure(self.name());
        if balance > 0.0
            && (dir_exposure + size_usd) / balance > self.config.max_total_directional_pct
        {
            debug!("directional exposure cap reached");
            return Ok(false);
        }

        if size_usd < self.config.min_trade_usd {
            return Ok(false);
        }
        let size_usd = size_usd.min(self.config.max_trade_usd);

        let mut shares = size_usd / buy_price;
        let fill = book_analyzer::walk_asks(&buy_asks, shares);
        if !fill.fully_fillable {
            shares = fill.total_filled;
            if shares * buy_price < self.config.min_trade_usd {
                return Ok(false);
            }
        }

        let request = TradeRequest {
            strategy: self.name().to_string(),
            size_usd: fill.total_cost,
            max_loss_usd: fill.total_cost,
        };
        let (approved, reason) = self.risk.check_trade(balance, &request);
        if !approved {
            info!(market = %market.question, reason, "directional trade rejected");
            return Ok(false);
        }

        let ticket = self
            .coordinator
            .place_limit(buy_token, Side::Buy, buy_price, shares)
            .await?;
        if !self.coordinator.wait_for_fill(&ticket).await? {
            return Ok(false);
        }

        self.ledger.open_position(Position {
            token_id: buy_token.to_string(),
            strategy: self.name().to_string(),
            market_name: market.question.clone(),
            side: buy_side.to_string(),
            entry_price: buy_price,
            size_usd: buy_price * shares,
            shares,
            opened_at: chrono::Utc::now(),
        });

        if self.config.dry_run {
            let mut rng = rand::thread_rng();
            let win = rng.gen::<f64>() < model_prob;
            let exit_price = if win { 1.0 } else { 0.0 };
            let pnl_usd = (exit_price - buy_price) * shares;
            let new_balance = balance + pnl_usd;
            let phase = self.phase.get();
            if let Some(record) = self.ledger.close_position(buy_token, exit_price, new_balance, phase) {
                info!(
                    market = %market.question,
                    result = if win { "WIN" } else { "LOSS" },
                    pnl = record.pnl_usd,
                    "[dry run] directional position resolved"
                );
                if let Err(err) = self.journal.record(&record) {
                    warn!(%err, "failed to append trade to journal");
                }
            }
            self.risk.record_trade_completed(win);
        }

        Ok(true)
    }
}

#[async_trait]
impl Strategy for DirectionalEngine {
    fn name(&self) -> &'static str {
        "directional_engine"
    }

    async fn scan_and_execute(&self) -> Result<()> {
        if self.disabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.check_auto_disable();
        if self.disabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut open_count = self.ledger.strategy_position_count(self.name());
        if open_count >= self.config.max_concurrent_directional as usize {
            return Ok(());
        }

        let Some((btc_price, hourly_vol)) = self.vol_cache.get(self.oracle.as_ref()).await else {
            return Ok(());
        };

        let balance = self.venue.get_balance().await?;
        let markets = self
            .catalog
            .tradable_markets(self.config.min_market_volume_usd)
            .await?;

        for market in markets {
            if open_count >= self.config.max_concurrent_directional as usize {
                break;
            }
            if !self.matches_asset(&market.question) {
                continue;
            }
            match self.evaluate_market(&market, btc_price, hourly_vol, balance).await {
                Ok(true) => open_count += 1,
                Ok(false) => {}
                Err(err) => warn!(market = %market.question, %err, "directional evaluation failed"),
            }
        }
        Ok(())
    }
}

impl DirectionalEngine {
    fn matches_asset(&self, question: &str) -> bool {
        let lower = question.to_lowercase();
        self.config
            .resolution_asset_keywords
            .iter()
            .any(|kw| lower.contains(kw.as_str()))
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

    fn test_journal() -> Arc<Journal> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        std::mem::forget(dir);
        Arc::new(Journal::new(path, 1000.0))
    }

    fn market() -> Market {
        Market {
            condition_id: "c1".to_string(),
            question: "Will BTC be above $65,000 by tomorrow?".to_string(),
            active: true,
            closed: false,
            enable_order_book: true,
            volume_usd: 5000.0,
            created_at: chrono::Utc::now(),
            end_date: chrono::Utc::now() + chrono::Duration::hours(6),
            tokens: vec![
                Token { token_id: "yes".into(), outcome: "Yes".into() },
                Token { token_id: "no".into(), outcome: "No".into() },
            ],
        }
    }

    fn flat_closes(price: f64, n: usize) -> Vec<f64> {
        // Tiny deterministic wiggle so log-returns aren't all exactly zero
        // (a zero-variance series would make scaled_vol 0 and skip every
        // market), while staying close enough to `price` for the test's
        // strike math to hold.
        (0..n)
            .map(|i| price * (1.0 + 0.0005 * ((i % 2) as f64 * 2.0 - 1.0)))
            .collect()
    }

    #[tokio::test]
    async fn enters_directional_position_on_large_model_edge() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        // YES ask far below the model's implied probability of BTC finishing
        // above a strike it is already comfortably above.
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.50, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![market()]));
        let oracle: Arc<dyn PriceOracle> = Arc::new(FixedPriceOracle {
            price: 70000.0,
            closes_1m: flat_closes(70000.0, 200),
        });
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        risk.set_day_start_balance(1000.0);
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = DirectionalEngine::new(
            catalog,
            venue,
            oracle,
            coordinator,
            ledger.clone(),
            risk,
            Arc::new(CurrentPhase::new(3)),
            test_journal(),
            config,
        );
        strategy.scan_and_execute().await.unwrap();

        assert_eq!(ledger.trade_history().len(), 1);
    }

    #[tokio::test]
    async fn skips_market_with_no_volatility_data() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        venue.seed_book(
            "yes",
            OrderBookSide::new(vec![PriceLevel { price: 0.50, size: 1000.0 }]),
            OrderBookSide::default(),
        );
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![market()]));
        let oracle: Arc<dyn PriceOracle> =
            Arc::new(FixedPriceOracle { price: 70000.0, ..Default::default() });
        let ledger = Arc::new(PositionLedger::new());
        let config = Config::default();
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        let strategy = DirectionalEngine::new(
            catalog,
            venue,
            oracle,
            coordinator,
            ledger.clone(),
            risk,
            Arc::new(CurrentPhase::new(3)),
            test_journal(),
            config,
        );
        strategy.scan_and_execute().await.unwrap();

        assert!(ledger.trade_history().is_empty());
    }

    #[tokio::test]
    async fn auto_disables_after_losing_streak_below_floor() {
        let venue = Arc::new(DryRunVenue::new(1000.0));
        let catalog: Arc<dyn MarketCatalog> = Arc::new(StaticCatalog::new(vec![]));
        let oracle: Arc<dyn PriceOracle> =
            Arc::new(FixedPriceOracle { price: 70000.0, ..Default::default() });
        let ledger = Arc::new(PositionLedger::new());
        let mut config = Config::default();
        config.directional_min_sample = 3;
        config.directional_min_win_rate = 0.5;
        let risk = Arc::new(RiskManager::new(config.clone(), ledger.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(venue.clone(), &config));

        for i in 0..3 {
            ledger.open_position(Position {
                token_id: format!("t{i}"),
                strategy: "directional_engine".to_string(),
                market_name: "x".to_string(),
                side: "YES".to_string(),
                entry_price: 0.5,
                size_usd: 50.0,
                shares: 100.0,
                opened_at: chrono::Utc::now(),
            });
            ledger.close_position(&format!("t{i}"), 0.0, 1000.0, 3);
        }

        let strategy = DirectionalEngine::new(
            catalog,
            venue,
            oracle,
            coordinator,
            ledger.clone(),
            risk,
            Arc::new(CurrentPhase::new(3)),
            test_journal(),
            config,
        );
        strategy.scan_and_execute().await.unwrap();

        assert!(strategy.disabled.load(Ordering::Relaxed));
    }
}

//! Open/closed position bookkeeping, exposure queries, and win/loss streaks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,
    pub strategy: String,
    pub market_name: String,
    pub side: String,
    pub entry_price: f64,
    pub size_usd: f64,
    pub shares: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn cost_basis(&self) -> f64 {
        self.size_usd
    }

    pub fn pnl(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.shares
    }

    pub fn pnl_pct(&self, exit_price: f64) -> f64 {
        if self.cost_basis() > 0.0 {
            self.pnl(exit_price) / self.cost_basis()
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub market_name: String,
    pub side: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size_usd: f64,
    pub pnl_usd: f64,
    pub pnl_pct: f64,
    pub balance_after: f64,
    pub phase: u8,
}

#[derive(Debug, Default)]
struct LedgerState {
    open: Vec<Position>,
    history: Vec<TradeRecord>,
    consecutive_wins: u32,
    consecutive_losses: u32,
    peak_consecutive_wins: u32,
    peak_consecutive_losses: u32,
}

/// Owns every open/closed position and the derived exposure and streak
/// queries the risk manager and strategies depend on. Internally
/// single-locked so every public method observes a consistent snapshot.
#[derive(Default)]
pub struct PositionLedger {
    state: Mutex<LedgerState>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_position(&self, position: Position) {
        self.state.lock().open.push(position);
    }

    /// Closes the most recently opened still-open position for `token_id`,
    /// recording a trade at `exit_price`. Returns `None` if no open
    /// position exists for that token.
    pub fn close_position(
        &self,
        token_id: &str,
        exit_price: f64,
        balance_after: f64,
        phase: u8,
    ) -> Option<TradeRecord> {
        let mut state = self.state.lock();
        let idx = state.open.iter().rposition(|p| p.token_id == token_id)?;
        let position = state.open.remove(idx);

        let pnl_usd = position.pnl(exit_price);
        let pnl_pct = position.pnl_pct(exit_price);
        let is_win = pnl_usd >= 0.0;

        if is_win {
            state.consecutive_wins += 1;
            state.consecutive_losses = 0;
            state.peak_consecutive_wins = state.peak_consecutive_wins.max(state.consecutive_wins);
        } else {
            state.consecutive_losses += 1;
            state.consecutive_wins = 0;
            state.peak_consecutive_losses =
                state.peak_consecutive_losses.max(state.consecutive_losses);
        }

        let record = TradeRecord {
            timestamp: Utc::now(),
            strategy: position.strategy.clone(),
            market_name: position.market_name.clone(),
            side: position.side.clone(),
            entry_price: position.entry_price,
            exit_price,
            size_usd: position.size_usd,
            pnl_usd,
            pnl_pct,
            balance_after,
            phase,
        };
        state.history.push(record.clone());
        Some(record)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.state.lock().open.clone()
    }

    pub fn total_exposure(&self) -> f64 {
        self.state.lock().open.iter().map(|p| p.size_usd).sum()
    }

    pub fn strategy_exposure(&self, strategy: &str) -> f64 {
        self.state
            .lock()
            .open
            .iter()
            .filter(|p| p.strategy == strategy)
            .map(|p| p.size_usd)
            .sum()
    }

    pub fn strategy_position_count(&self, strategy: &str) -> usize {
        self.state
            .lock()
            .open
            .iter()
            .filter(|p| p.strategy == strategy)
            .count()
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.state.lock().consecutive_losses
    }

    pub fn consecutive_wins(&self) -> u32 {
        self.state.lock().consecutive_wins
    }

    pub fn trade_history(&self) -> Vec<TradeRecord> {
        self.state.lock().history.clone()
    }

    pub fn strategy_trade_history(&self, strategy: &str) -> Vec<TradeRecord> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|t| t.strategy == strategy)
            .cloned()
            .collect()
    }

    pub fn strategy_win_rate(&self, strategy: &str) -> Option<f64> {
        let trades = self.strategy_trade_history(strategy);
        if trades.is_empty() {
            return None;
        }
        let wins = trades.iter().filter(|t| t.pnl_usd >= 0.0).count();
        Some(wins as f64 / trades.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(token_id: &str, entry_price: f64, shares: f64) -> Position {
        Position {
            token_id: token_id.to_string(),
            strategy: "sum_to_one".to_string(),
            market_name: "Will it happen?".to_string(),
            side: "YES".to_string(),
            entry_price,
            size_usd: entry_price * shares,
            shares,
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn close_position_computes_pnl_and_streak() {
        let ledger = PositionLedger::new();
        ledger.open_position(position("t1", 0.40, 100.0));
        let record = ledger.close_position("t1", 0.50, 1050.0, 1).unwrap();
        assert!((record.pnl_usd - 10.0).abs() < 1e-9);
        assert_eq!(ledger.consecutive_wins(), 1);
        assert_eq!(ledger.consecutive_losses(), 0);
        assert!(ledger.open_positions().is_empty());
    }

    #[test]
    fn close_position_returns_none_when_not_found() {
        let ledger = PositionLedger::new();
        assert!(ledger.close_position("missing", 0.5, 1000.0, 1).is_none());
    }

    #[test]
    fn exposure_is_sum_of_open_sizes() {
        let ledger = PositionLedger::new();
        ledger.open_position(position("t1", 0.40, 100.0));
        ledger.open_position(position("t2", 0.30, 50.0));
        assert!((ledger.total_exposure() - (40.0 + 15.0)).abs() < 1e-9);
        assert_eq!(ledger.strategy_position_count("sum_to_one"), 2);
    }

    #[test]
    fn losing_trade_resets_win_streak_and_builds_loss_streak() {
        let ledger = PositionLedger::new();
        ledger.open_position(position("t1", 0.40, 100.0));
        ledger.close_position("t1", 0.20, 980.0, 1);
        assert_eq!(ledger.consecutive_losses(), 1);
        assert_eq!(ledger.consecutive_wins(), 0);
    }
}

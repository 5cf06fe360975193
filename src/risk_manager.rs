//! Trade-approval gate and the NORMAL/COOLDOWN/RECOVERY circuit breaker.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::position_ledger::PositionLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskState {
    Normal,
    Cooldown,
    Recovery,
}

#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub strategy: String,
    pub size_usd: f64,
    pub max_loss_usd: f64,
}

impl TradeRequest {
    pub fn cost_usd(&self) -> f64 {
        self.size_usd
    }
}

struct State {
    risk_state: RiskState,
    cooldown_until: Option<DateTime<Utc>>,
    recovery_trades_remaining: u32,
    day_start_balance: Option<f64>,
    day_start_at: DateTime<Utc>,
}

/// Gates every trade request through the same ordered checks the original
/// engine used, and owns the cooldown/recovery state machine.
pub struct RiskManager {
    config: Config,
    ledger: std::sync::Arc<PositionLedger>,
    state: Mutex<State>,
}

impl RiskManager {
    pub fn new(config: Config, ledger: std::sync::Arc<PositionLedger>) -> Self {
        let now = Utc::now();
        Self {
            config,
            ledger,
            state: Mutex::new(State {
                risk_state: RiskState::Normal,
                cooldown_until: None,
                recovery_trades_remaining: 0,
                day_start_balance: None,
                day_start_at: now,
            }),
        }
    }

    pub fn set_day_start_balance(&self, balance: f64) {
        let mut state = self.state.lock();
        state.day_start_balance = Some(balance);
        state.day_start_at = Utc::now();
    }

    /// Re-anchors the daily-drawdown baseline if the UTC calendar date has
    /// advanced since it was last set.
    pub fn roll_day_if_needed(&self, balance: f64) {
        let mut state = self.state.lock();
        if Utc::now().date_naive() != state.day_start_at.date_naive() {
            state.day_start_balance = Some(balance);
            state.day_start_at = Utc::now();
        }
    }

    pub fn state(&self) -> RiskState {
        self.state.lock().risk_state
    }

    pub fn is_trading_allowed(&self) -> bool {
        !matches!(self.current_state_after_lazy_transition(), RiskState::Cooldown)
    }

    fn current_state_after_lazy_transition(&self) -> RiskState {
        let mut state = self.state.lock();
        if state.risk_state == RiskState::Cooldown {
            if let Some(until) = state.cooldown_until {
                if Utc::now() >= until {
                    state.risk_state = RiskState::Recovery;
                    state.recovery_trades_remaining = self.config.recovery_trade_count;
                    state.cooldown_until = None;
                }
            }
        }
        state.risk_state
    }

    /// Runs the full ordered gate. Returns `(approved, reason)`; `reason`
    /// is always populated, even on approval, for logging.
    pub fn check_trade(&self, balance: f64, request: &TradeRequest) -> (bool, String) {
        let current = self.current_state_after_lazy_transition();

        if current == RiskState::Cooldown {
            return (false, "in cooldown".to_string());
        }

        if let Some(day_start) = self.state.lock().day_start_balance {
            if day_start > 0.0 {
                let drawdown_pct = (day_start - balance) / day_start;
                if drawdown_pct >= self.config.max_daily_drawdown_pct {
                    self.enter_cooldown(false);
                    return (false, format!("daily drawdown {drawdown_pct:.4} exceeded"));
                }
            }
        }

        if current != RiskState::Recovery
            && self.ledger.consecutive_losses() >= self.config.max_consecutive_losses
        {
            self.enter_cooldown(false);
            return (false, "consecutive loss limit reached".to_string());
        }

        if request.max_loss_usd > self.config.max_single_loss_pct * balance {
            return (false, "single-trade max loss exceeds limit".to_string());
        }

        if request.cost_usd() > self.config.max_position_pct * balance {
            return (false, "position size exceeds max position pct".to_string());
        }

        let total_exposure = self.ledger.total_exposure();
        if total_exposure + request.cost_usd() > self.config.max_total_exposure_pct * balance {
            return (false, "total exposure limit exceeded".to_string());
        }

        let strategy_exposure = self.ledger.strategy_exposure(&request.strategy);
        if strategy_exposure + request.cost_usd()
            > self.config.max_strategy_exposure_pct * balance
        {
            return (false, "strategy exposure limit exceeded".to_string());
        }

        if request.cost_usd() < self.config.min_trade_usd {
            return (false, "below minimum trade size".to_string());
        }

        if request.cost_usd() > self.config.max_trade_usd {
            return (false, "above maximum trade size".to_string());
        }

        (true, "approved".to_string())
    }

    /// Position-size multiplier applied by strategies before sizing a
    /// trade: full size in NORMAL, reduced size in RECOVERY.
    pub fn position_multiplier(&self) -> f64 {
        match self.current_state_after_lazy_transition() {
            RiskState::Recovery => self.config.recovery_position_multiplier,
            _ => 1.0,
        }
    }

    /// Called once per closed trade, after the ledger has recorded it.
    pub fn record_trade_completed(&self, is_win: bool) {
        let mut state = self.state.lock();
        if state.risk_state == RiskState::Recovery {
            if !is_win {
                drop(state);
                self.enter_cooldown(true);
                return;
            }
            state.recovery_trades_remaining = state.recovery_trades_remaining.saturating_sub(1);
            if state.recovery_trades_remaining == 0 {
                state.risk_state = RiskState::Normal;
            }
        }
    }

    fn enter_cooldown(&self, extended: bool) {
        let mut state = self.state.lock();
        let minutes = self.config.cooldown_minutes * if extended { 4 } else { 1 };
        state.risk_state = RiskState::Cooldown;
        state.cooldown_until = Some(Utc::now() + ChronoDuration::minutes(minutes));
    }
}

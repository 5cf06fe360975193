//! Single and paired order lifecycle: submission with retry, fill
//! monitoring, timeout-driven cancellation, and partial-fill recovery.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::venue::{OrderVenue, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Submitted,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PairedOrder {
    pub yes_leg: OrderTicket,
    pub no_leg: OrderTicket,
}

/// Which side of a paired order a leg outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLeg {
    Yes,
    No,
}

/// Outcome of monitoring a paired arb order to its timeout deadline.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    BothFilled,
    /// One leg filled and the recovery sell-back at entry also filled, so
    /// the ledger carries no residual exposure from this pair.
    RecoveredNoResidual { recovered_leg: PairLeg },
    /// One leg filled but the recovery sell-back did not fill before the
    /// timeout; the position is left open and must be recorded by the
    /// caller as a residual.
    UnrecoveredResidual { leg: PairLeg, entry_price: f64, size: f64 },
    NeitherFilled,
}

pub struct OrderCoordinator {
    venue: Arc<dyn OrderVenue>,
    max_retries: u32,
    retry_backoff_base_secs: f64,
    order_timeout: Duration,
}

impl OrderCoordinator {
    pub fn new(venue: Arc<dyn OrderVenue>, config: &Config) -> Self {
        Self {
            venue,
            max_retries: config.max_retries,
            retry_backoff_base_secs: config.retry_backoff_base_secs,
            order_timeout: config.order_timeout(),
        }
    }

    /// Places a single limit order, retrying with exponential backoff on
    /// venue error up to `max_retries` attempts.
    pub async fn place_limit(
        &self,
        token_id: &str,
        side: Side,
        price: f64,
        size: f64,
    ) -> Result<OrderTicket> {
        let mut last_err = None;
        for attempt in 0..self.max_retries {
            match self.venue.create_limit_order(token_id, side, price, size).await {
                Ok(order_id) => {
                    return Ok(OrderTicket {
                        token_id: token_id.to_string(),
                        side,
                        price,
                        size,
                        order_id: Some(order_id),
                        status: OrderStatus::Submitted,
                        submitted_at: Utc::now(),
                    });
                }
                Err(err) => {
                    warn!(attempt, %err, "order placement failed, retrying");
                    let backoff = self.retry_backoff_base_secs.powi(attempt as i32);
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted retries placing order")))
    }

    /// Submits both legs of an arb pair concurrently. If either leg fails
    /// to submit, cancels whichever leg did submit and returns an error.
    pub async fn place_arb_pair(
        &self,
        yes_token_id: &str,
        yes_price: f64,
        no_token_id: &str,
        no_price: f64,
        size: f64,
    ) -> Result<PairedOrder> {
        let (yes_result, no_result) = tokio::join!(
            self.place_limit(yes_token_id, Side::Buy, yes_price, size),
            self.place_limit(no_token_id, Side::Buy, no_price, size),
        );

        match (yes_result, no_result) {
            (Ok(yes_leg), Ok(no_leg)) => Ok(PairedOrder { yes_leg, no_leg }),
            (Ok(yes_leg), Err(err)) => {
                self.cancel_if_submitted(&yes_leg).await;
                Err(err).context_leg("no")
            }
            (Err(err), Ok(no_leg)) => {
                self.cancel_if_submitted(&no_leg).await;
                Err(err).context_leg("yes")
            }
            (Err(yes_err), Err(_)) => Err(yes_err).context_leg("both"),
        }
    }

    /// Polls both legs of a paired order until both fill, the deadline
    /// elapses, or one fills and the other is cancelled (with the filled
    /// leg unwound by selling back at its entry price).
    pub async fn monitor_arb_fills(&self, pair: &PairedOrder) -> Result<PairOutcome> {
        let deadline = Utc::now() + chrono::Duration::from_std(self.order_timeout).unwrap();

        loop {
            let yes_filled = self.is_filled(&pair.yes_leg).await?;
            let no_filled = self.is_filled(&pair.no_leg).await?;

            if yes_filled && no_filled {
                info!("both legs of arb pair filled");
                return Ok(PairOutcome::BothFilled);
            }

            if Utc::now() >= deadline {
                return self.resolve_timeout(pair, yes_filled, no_filled).await;
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn resolve_timeout(
        &self,
        pair: &PairedOrder,
        yes_filled: bool,
        no_filled: bool,
    ) -> Result<PairOutcome> {
        match (yes_filled, no_filled) {
            (true, false) => {
                self.cancel_if_submitted(&pair.no_leg).await;
                self.recover_leg_outcome(&pair.yes_leg, PairLeg::Yes).await
            }
            (false, true) => {
                self.cancel_if_submitted(&pair.yes_leg).await;
                self.recover_leg_outcome(&pair.no_leg, PairLeg::No).await
            }
            (false, false) => {
                self.cancel_if_submitted(&pair.yes_leg).await;
                self.cancel_if_submitted(&pair.no_leg).await;
                Ok(PairOutcome::NeitherFilled)
            }
            (true, true) => Ok(PairOutcome::BothFilled),
        }
    }

    async fn recover_leg_outcome(&self, leg: &OrderTicket, which: PairLeg) -> Result<PairOutcome> {
        if self.recover_filled_leg(leg).await {
            Ok(PairOutcome::RecoveredNoResidual { recovered_leg: which })
        } else {
            Ok(PairOutcome::UnrecoveredResidual {
                leg: which,
                entry_price: leg.price,
                size: leg.size,
            })
        }
    }

    /// Sells a filled leg back at its entry price and waits up to the
    /// order timeout for the unwind to fill. If it doesn't, the position
    /// is left open and a warning is logged — matching the original's
    /// "no further automated recovery" behavior. Returns whether the
    /// recovery sell filled.
    async fn recover_filled_leg(&self, leg: &OrderTicket) -> bool {
        let sell = self
            .place_limit(&leg.token_id, Side::Sell, leg.price, leg.size)
            .await;

        let Ok(sell_ticket) = sell else {
            warn!(token_id = %leg.token_id, "failed to submit recovery sell, position left open");
            return false;
        };

        let deadline = Utc::now() + chrono::Duration::from_std(self.order_timeout).unwrap();
        loop {
            if self.is_filled(&sell_ticket).await.unwrap_or(false) {
                info!(token_id = %leg.token_id, "recovery sell filled");
                return true;
            }
            if Utc::now() >= deadline {
                warn!(
                    token_id = %leg.token_id,
                    "recovery sell did not fill before timeout, position left open"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn is_filled(&self, ticket: &OrderTicket) -> Result<bool> {
        match &ticket.order_id {
            Some(id) => self.venue.is_filled(id).await,
            None => Ok(false),
        }
    }

    /// Polls a single order until it fills or the timeout elapses,
    /// cancelling it in the latter case. Returns whether it filled.
    pub async fn wait_for_fill(&self, ticket: &OrderTicket) -> Result<bool> {
        let deadline = Utc::now() + chrono::Duration::from_std(self.order_timeout).unwrap();
        loop {
            if self.is_filled(ticket).await? {
                return Ok(true);
            }
            if Utc::now() >= deadline {
                self.cancel_if_submitted(ticket).await;
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn cancel_if_submitted(&self, ticket: &OrderTicket) {
        if let Some(id) = &ticket.order_id {
            if let Err(err) = self.venue.cancel_order(id).await {
                warn!(order_id = %id, %err, "failed to cancel order");
            }
        }
    }

    pub async fn cancel_all(&self) -> Result<()> {
        self.venue.cancel_all_orders().await
    }
}

trait LegContext<T> {
    fn context_leg(self, which: &str) -> Result<T>;
}

impl<T> LegContext<T> for Result<T> {
    fn context_leg(self, which: &str) -> Result<T> {
        use anyhow::Context;
        self.with_context(|| format!("arb pair submission failed (leg: {which})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::DryRunVenue;

    fn coordinator() -> OrderCoordinator {
        let venue: Arc<dyn OrderVenue> = Arc::new(DryRunVenue::new(1000.0));
        let mut config = Config::default();
        config.order_timeout_secs = 1;
        OrderCoordinator::new(venue, &config)
    }

    #[tokio::test]
    async fn place_limit_succeeds_against_dry_run_venue() {
        let coord = coordinator();
        let ticket = coord.place_limit("t1", Side::Buy, 0.4, 10.0).await.unwrap();
        assert_eq!(ticket.status, OrderStatus::Submitted);
        assert!(ticket.order_id.is_some());
    }

    #[tokio::test]
    async fn place_arb_pair_and_monitor_both_fill_in_dry_run() {
        let coord = coordinator();
        let pair = coord
            .place_arb_pair("yes", 0.6, "no", 0.35, 10.0)
            .await
            .unwrap();
        let outcome = coord.monitor_arb_fills(&pair).await.unwrap();
        assert_eq!(outcome, PairOutcome::BothFilled);
    }
}

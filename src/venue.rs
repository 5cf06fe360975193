//! The order-placement/cancellation/book-query boundary. `DryRunVenue`
//! simulates fills in-process; `ClobVenue` talks to a real CLOB over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::book_analyzer::OrderBookSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub token_id: String,
}

/// The CLOB order-placement/cancellation/book-query boundary. Out of scope
/// as a feature surface; this crate only defines the shape it relies on.
#[async_trait]
pub trait OrderVenue: Send + Sync {
    async fn self_test(&self) -> Result<()>;
    async fn get_balance(&self) -> Result<f64>;
    async fn get_order_book(&self, token_id: &str) -> Result<(OrderBookSide, OrderBookSide)>;
    async fn create_limit_order(
        &self,
        token_id: &str,
        side: Side,
        price: f64,
        size: f64,
    ) -> Result<String>;
    async fn cancel_order(&self, order_id: &str) -> Result<()>;
    async fn cancel_all_orders(&self) -> Result<()>;
    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>>;

    /// True once an order is no longer present among open orders (filled
    /// or cancelled-by-venue); the dry-run placeholder id is always filled.
    async fn is_filled(&self, order_id: &str) -> Result<bool> {
        if order_id == "dry-run-placeholder" {
            return Ok(true);
        }
        let open = self.get_open_orders().await?;
        Ok(!open.iter().any(|o| o.order_id == order_id))
    }
}

/// Deterministic in-memory venue for dry-run mode. Every order fills
/// immediately at the requested price, matching the original client's
/// `"dry-run-placeholder"` / `"simulated"` short-circuit.
pub struct DryRunVenue {
    balance: Mutex<f64>,
    books: Mutex<std::collections::HashMap<String, (OrderBookSide, OrderBookSide)>>,
    next_id: AtomicU64,
}

impl DryRunVenue {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balance: Mutex::new(starting_balance),
            books: Mutex::new(std::collections::HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn seed_book(&self, token_id: &str, asks: OrderBookSide, bids: OrderBookSide) {
        self.books
            .lock()
            .insert(token_id.to_string(), (asks, bids));
    }

    pub fn set_balance(&self, balance: f64) {
        *self.balance.lock() = balance;
    }
}

#[async_trait]
impl OrderVenue for DryRunVenue {
    async fn self_test(&self) -> Result<()> {
        Ok(())
    }

    async fn get_balance(&self) -> Result<f64> {
        Ok(*self.balance.lock())
    }

    async fn get_order_book(&self, token_id: &str) -> Result<(OrderBookSide, OrderBookSide)> {
        self.books
            .lock()
            .get(token_id)
            .cloned()
            .context("no book seeded for token")
    }

    async fn create_limit_order(
        &self,
        _token_id: &str,
        _side: Side,
        _price: f64,
        _size: f64,
    ) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("dry-run-placeholder-{id}"))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<()> {
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<()> {
        Ok(())
    }

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
        Ok(Vec::new())
    }

    async fn is_filled(&self, _order_id: &str) -> Result<bool> {
        Ok(true)
    }
}

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Real CLOB venue. Retry/backoff/rate-limit idiom mirrors the catalog
/// client: exponential backoff doubling per attempt, capped, with a 10x
/// penalty sleep on HTTP 429.
pub struct ClobVenue {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl ClobVenue {
    pub fn new(base_url: impl Into<String>, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("polymarket-compounder/0.1")
            .build()
            .context("failed to build CLOB HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries,
        })
    }

    async fn execute_with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            match tokio::time::timeout(Duration::from_secs(10), op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    let is_rate_limited = err
                        .status()
                        .map(|s| s.as_u16() == 429)
                        .unwrap_or(false);
                    let sleep_ms = if is_rate_limited {
                        backoff_ms * 10
                    } else {
                        backoff_ms
                    };
                    warn!(attempt, sleep_ms, "clob request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                    last_err = Some(anyhow::Error::from(err));
                }
                Err(_) => {
                    warn!(attempt, "clob request timed out, retrying");
                    last_err = Some(anyhow::anyhow!("request timed out"));
                }
            }
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted retries")))
    }
}

#[async_trait]
impl OrderVenue for ClobVenue {
    async fn self_test(&self) -> Result<()> {
        let url = format!("{}/", self.base_url);
        self.execute_with_retry(|| self.client.get(&url).send())
            .await
            .context("clob self-test request failed")?;
        Ok(())
    }

    async fn get_balance(&self) -> Result<f64> {
        anyhow::bail!("ClobVenue::get_balance requires wallet integration, out of scope")
    }

    async fn get_order_book(&self, _token_id: &str) -> Result<(OrderBookSide, OrderBookSide)> {
        anyhow::bail!("ClobVenue::get_order_book not implemented for this reference adapter")
    }

    async fn create_limit_order(
        &self,
        _token_id: &str,
        _side: Side,
        _price: f64,
        _size: f64,
    ) -> Result<String> {
        anyhow::bail!("ClobVenue::create_limit_order requires a request signer, out of scope")
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<()> {
        anyhow::bail!("ClobVenue::cancel_order requires a request signer, out of scope")
    }

    async fn cancel_all_orders(&self) -> Result<()> {
        anyhow::bail!("ClobVenue::cancel_all_orders requires a request signer, out of scope")
    }

    async fn get_open_orders(&self) -> Result<Vec<OpenOrder>> {
        anyhow::bail!("ClobVenue::get_open_orders requires a request signer, out of scope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book_analyzer::PriceLevel;

    #[tokio::test]
    async fn dry_run_venue_fills_immediately() {
        let venue = DryRunVenue::new(1000.0);
        let id = venue
            .create_limit_order("t1", Side::Buy, 0.4, 10.0)
            .await
            .unwrap();
        assert!(venue.is_filled(&id).await.unwrap());
    }

    #[tokio::test]
    async fn dry_run_venue_serves_seeded_book() {
        let venue = DryRunVenue::new(1000.0);
        venue.seed_book(
            "t1",
            OrderBookSide::new(vec![PriceLevel { price: 0.4, size: 100.0 }]),
            OrderBookSide::new(vec![PriceLevel { price: 0.38, size: 100.0 }]),
        );
        let (asks, bids) = venue.get_order_book("t1").await.unwrap();
        assert_eq!(asks.levels[0].price, 0.4);
        assert_eq!(bids.levels[0].price, 0.38);
    }
}

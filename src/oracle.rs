//! External price confirmation: agreement between two independent sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::EngineError;

/// Two-source external price lookup. Out of scope as a feature surface;
/// this crate only defines the shape the directional/resolution strategies
/// rely on.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price_a(&self, asset: &str) -> Result<f64>;
    async fn price_b(&self, asset: &str) -> Result<f64>;

    /// One-minute close prices for the trailing window, oldest first.
    /// Used by the directional engine to estimate realized volatility.
    /// Sources that can't supply historical closes return an error.
    async fn recent_closes_1m(&self, _asset: &str) -> Result<Vec<f64>> {
        anyhow::bail!("this price oracle does not support historical closes")
    }

    /// Returns the agreed price if both sources fall within
    /// `tolerance_pct` of each other, falling back to whichever source
    /// responded if the other failed.
    async fn confirmed_price(&self, asset: &str, tolerance_pct: f64) -> Result<f64> {
        let a = self.price_a(asset).await;
        let b = self.price_b(asset).await;

        match (a, b) {
            (Ok(a), Ok(b)) => {
                let spread_pct = (a - b).abs() / a.max(b);
                if spread_pct <= tolerance_pct {
                    Ok((a + b) / 2.0)
                } else {
                    Err(EngineError::OracleDisagreement { a, b, tolerance_pct }.into())
                }
            }
            (Ok(a), Err(_)) => Ok(a),
            (Err(_), Ok(b)) => Ok(b),
            (Err(e), Err(_)) => Err(e).context("both price oracle sources failed"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoingeckoResponse {
    #[serde(flatten)]
    prices: std::collections::HashMap<String, std::collections::HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct BinanceTickerResponse {
    price: String,
}

/// A single Binance kline: `[open_time, open, high, low, close, volume, ...]`.
/// Only the close price (index 4) is used.
#[derive(Debug, Deserialize)]
struct BinanceKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
);

/// Real oracle backed by two configurable HTTP endpoints (defaulting to the
/// CoinGecko simple-price and Binance ticker shapes).
pub struct HttpPriceOracle {
    client: reqwest::Client,
    source_a_base: String,
    source_b_base: String,
}

impl HttpPriceOracle {
    pub fn new(source_a_base: impl Into<String>, source_b_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            source_a_base: source_a_base.into(),
            source_b_base: source_b_base.into(),
        }
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    async fn price_a(&self, asset: &str) -> Result<f64> {
        let url = format!(
            "{}/simple/price?ids={asset}&vs_currencies=usd",
            self.source_a_base
        );
        let resp: CoingeckoResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("source a price request failed")?
            .json()
            .await
            .context("failed to parse source a response")?;
        resp.prices
            .get(asset)
            .and_then(|m| m.get("usd"))
            .copied()
            .context("asset not present in source a response")
    }

    async fn price_b(&self, asset: &str) -> Result<f64> {
        let symbol = format!("{}USDT", asset.to_uppercase());
        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.source_b_base);
        let resp: BinanceTickerResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("source b price request failed")?
            .json()
            .await
            .context("failed to parse source b response")?;
        resp.price.parse().context("source b returned a non-numeric price")
    }

    /// Fetches up to 1440 one-minute klines (one trading day) from the
    /// source-b (Binance-shaped) endpoint and returns their close prices.
    async fn recent_closes_1m(&self, asset: &str) -> Result<Vec<f64>> {
        let symbol = format!("{}USDT", asset.to_uppercase());
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval=1m&limit=1440",
            self.source_b_base
        );
        let klines: Vec<BinanceKline> = self
            .client
            .get(&url)
            .send()
            .await
            .context("klines request failed")?
            .json()
            .await
            .context("failed to parse klines response")?;

        klines
            .into_iter()
            .map(|k| k.4.parse::<f64>().context("kline close price was not numeric"))
            .collect()
    }
}

/// Fixed-value oracle for tests.
pub struct FixedPriceOracle {
    pub price: f64,
    pub closes_1m: Vec<f64>,
}

impl Default for FixedPriceOracle {
    fn default() -> Self {
        Self { price: 0.0, closes_1m: Vec::new() }
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn price_a(&self, _asset: &str) -> Result<f64> {
        Ok(self.price)
    }

    async fn price_b(&self, _asset: &str) -> Result<f64> {
        Ok(self.price)
    }

    async fn recent_closes_1m(&self, _asset: &str) -> Result<Vec<f64>> {
        if self.closes_1m.is_empty() {
            anyhow::bail!("no fixed closes configured");
        }
        Ok(self.closes_1m.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_oracle_agrees_with_itself() {
        let oracle = FixedPriceOracle { price: 65000.0, ..Default::default() };
        let price = oracle.confirmed_price("btc", 0.005).await.unwrap();
        assert_eq!(price, 65000.0);
    }
}

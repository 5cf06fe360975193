//! Market discovery: fetching active markets and detecting newly listed ones.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::market::Market;

/// Gamma-API-style market metadata lookup. Out of scope as a feature
/// surface; this crate only defines the shape strategies rely on.
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn active_markets(&self) -> Result<Vec<Market>>;

    async fn tradable_markets(&self, min_volume_usd: f64) -> Result<Vec<Market>> {
        Ok(self
            .active_markets()
            .await?
            .into_iter()
            .filter(|m| m.is_tradable(min_volume_usd))
            .collect())
    }

    /// Markets no older than `max_age_secs`. The default implementation
    /// filters by age alone; catalogs that can distinguish "previously
    /// seen" from "new" (like [`GammaMarketCatalog`]) should override this
    /// to also exclude markets already returned by a prior call.
    async fn new_markets(&self, max_age_secs: i64) -> Result<Vec<Market>> {
        let now = Utc::now();
        Ok(self
            .active_markets()
            .await?
            .into_iter()
            .filter(|m| m.age_secs(now) <= max_age_secs)
            .collect())
    }
}

const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Cache {
    markets: Vec<Market>,
    fetched_at: Option<std::time::Instant>,
    known_ids: HashSet<String>,
}

/// Real catalog backed by the Gamma markets endpoint, with a 60s fetch
/// cache and new-market detection against the set of previously-seen ids.
pub struct GammaMarketCatalog {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<Cache>,
}

#[derive(Debug, Deserialize)]
struct GammaToken {
    token_id: String,
    outcome: String,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    condition_id: String,
    question: String,
    active: bool,
    closed: bool,
    #[serde(default)]
    enable_order_book: bool,
    #[serde(default)]
    volume: f64,
    created_at: chrono::DateTime<Utc>,
    end_date: chrono::DateTime<Utc>,
    tokens: Vec<GammaToken>,
}

impl From<GammaMarket> for Market {
    fn from(g: GammaMarket) -> Self {
        Market {
            condition_id: g.condition_id,
            question: g.question,
            active: g.active,
            closed: g.closed,
            enable_order_book: g.enable_order_book,
            volume_usd: g.volume,
            created_at: g.created_at,
            end_date: g.end_date,
            tokens: g
                .tokens
                .into_iter()
                .map(|t| crate::market::Token {
                    token_id: t.token_id,
                    outcome: t.outcome,
                })
                .collect(),
        }
    }
}

impl GammaMarketCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("polymarket-compounder/0.1")
            .build()
            .context("failed to build gamma HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            cache: Mutex::new(Cache::default()),
        })
    }

    async fn fetch_fresh(&self) -> Result<Vec<Market>> {
        let url = format!("{}/markets", self.base_url);
        let raw: Vec<GammaMarket> = self
            .client
            .get(&url)
            .send()
            .await
            .context("gamma markets request failed")?
            .json()
            .await
            .context("failed to parse gamma markets response")?;
        Ok(raw.into_iter().map(Market::from).collect())
    }

}

#[async_trait]
impl MarketCatalog for GammaMarketCatalog {
    async fn active_markets(&self) -> Result<Vec<Market>> {
        {
            let cache = self.cache.lock();
            if let Some(fetched_at) = cache.fetched_at {
                if fetched_at.elapsed() < CACHE_TTL {
                    return Ok(cache.markets.clone());
                }
            }
        }

        let markets = self.fetch_fresh().await?;
        let mut cache = self.cache.lock();
        cache.markets = markets.clone();
        cache.fetched_at = Some(std::time::Instant::now());
        Ok(markets)
    }

    /// Markets whose condition_id has not been observed by a previous call
    /// to this method, and that are not older than `max_age_secs`.
    async fn new_markets(&self, max_age_secs: i64) -> Result<Vec<Market>> {
        let markets = self.active_markets().await?;
        let now = Utc::now();
        let mut cache = self.cache.lock();

        let fresh: Vec<Market> = markets
            .into_iter()
            .filter(|m| {
                !cache.known_ids.contains(&m.condition_id) && m.age_secs(now) <= max_age_secs
            })
            .collect();

        for m in &fresh {
            cache.known_ids.insert(m.condition_id.clone());
        }
        Ok(fresh)
    }
}

/// Fixed in-memory catalog for tests.
pub struct StaticCatalog {
    markets: Vec<Market>,
}

impl StaticCatalog {
    pub fn new(markets: Vec<Market>) -> Self {
        Self { markets }
    }
}

#[async_trait]
impl MarketCatalog for StaticCatalog {
    async fn active_markets(&self) -> Result<Vec<Market>> {
        Ok(self.markets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Token;
    use chrono::TimeZone;

    fn market(id: &str, volume: f64) -> Market {
        Market {
            condition_id: id.to_string(),
            question: "Will it happen?".to_string(),
            active: true,
            closed: false,
            enable_order_book: true,
            volume_usd: volume,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 1, 8, 0, 0, 0).unwrap(),
            tokens: vec![
                Token { token_id: "y".into(), outcome: "Yes".into() },
                Token { token_id: "n".into(), outcome: "No".into() },
            ],
        }
    }

    #[tokio::test]
    async fn static_catalog_filters_by_volume() {
        let catalog = StaticCatalog::new(vec![market("a", 5000.0), market("b", 10.0)]);
        let tradable = catalog.tradable_markets(1000.0).await.unwrap();
        assert_eq!(tradable.len(), 1);
        assert_eq!(tradable[0].condition_id, "a");
    }
}

//! Market and outcome-token data shared across the catalog, venue, and
//! strategy layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outcome token of a market (e.g. the YES or NO leg of a binary market).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: String,
    pub outcome: String,
}

/// A market as seen by the catalog, trimmed to the fields strategies need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub question: String,
    pub active: bool,
    pub closed: bool,
    pub enable_order_book: bool,
    pub volume_usd: f64,
    pub created_at: DateTime<Utc>,
    /// When the market resolves; used by the directional engine to scale
    /// its volatility model to the time remaining.
    pub end_date: DateTime<Utc>,
    pub tokens: Vec<Token>,
}

impl Market {
    /// Hours remaining until `end_date`, as of `now`. Negative once the
    /// market has closed.
    pub fn hours_to_resolve(&self, now: DateTime<Utc>) -> f64 {
        (self.end_date - now).num_seconds() as f64 / 3600.0
    }
    /// A market is tradable by this engine only if it has exactly two
    /// outcomes labelled (case-insensitively) yes/no.
    pub fn is_binary(&self) -> bool {
        self.tokens.len() == 2
            && self
                .tokens
                .iter()
                .any(|t| t.outcome.eq_ignore_ascii_case("yes"))
            && self
                .tokens
                .iter()
                .any(|t| t.outcome.eq_ignore_ascii_case("no"))
    }

    pub fn yes_token_id(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.outcome.eq_ignore_ascii_case("yes"))
            .map(|t| t.token_id.as_str())
    }

    pub fn no_token_id(&self) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.outcome.eq_ignore_ascii_case("no"))
            .map(|t| t.token_id.as_str())
    }

    pub fn is_tradable(&self, min_volume_usd: f64) -> bool {
        self.active
            && !self.closed
            && self.enable_order_book
            && self.is_binary()
            && self.volume_usd >= min_volume_usd
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn market(tokens: Vec<Token>) -> Market {
        Market {
            condition_id: "c1".to_string(),
            question: "Will it happen?".to_string(),
            active: true,
            closed: false,
            enable_order_book: true,
            volume_usd: 5000.0,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2026, 1, 8, 0, 0, 0).unwrap(),
            tokens,
        }
    }

    #[test]
    fn is_binary_requires_yes_and_no_tokens() {
        let m = market(vec![
            Token { token_id: "y".into(), outcome: "Yes".into() },
            Token { token_id: "n".into(), outcome: "No".into() },
        ]);
        assert!(m.is_binary());
        assert_eq!(m.yes_token_id(), Some("y"));
        assert_eq!(m.no_token_id(), Some("n"));
    }

    #[test]
    fn is_binary_false_for_multi_outcome() {
        let m = market(vec![
            Token { token_id: "a".into(), outcome: "A".into() },
            Token { token_id: "b".into(), outcome: "B".into() },
            Token { token_id: "c".into(), outcome: "C".into() },
        ]);
        assert!(!m.is_binary());
    }

    #[test]
    fn is_tradable_checks_all_gates() {
        let mut m = market(vec![
            Token { token_id: "y".into(), outcome: "Yes".into() },
            Token { token_id: "n".into(), outcome: "No".into() },
        ]);
        assert!(m.is_tradable(1000.0));
        m.volume_usd = 10.0;
        assert!(!m.is_tradable(1000.0));
    }

    #[test]
    fn hours_to_resolve_counts_down_to_end_date() {
        let m = market(vec![
            Token { token_id: "y".into(), outcome: "Yes".into() },
            Token { token_id: "n".into(), outcome: "No".into() },
        ]);
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 0, 0, 0).unwrap();
        assert!((m.hours_to_resolve(now) - 24.0).abs() < 1e-9);
    }
}

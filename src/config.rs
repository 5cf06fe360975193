use std::time::Duration;

/// Runtime configuration, loaded once at startup from the environment.
///
/// Every field has a sane production default;
/// values are parsed permissively and fall back to the default on any
/// parse failure rather than failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub dry_run: bool,
    pub clob_base_url: String,
    pub gamma_base_url: String,
    pub chain_id: u64,

    pub scan_interval_secs: u64,
    pub summary_every_cycles: u64,

    /// 1, 2, or 3 forces that phase regardless of balance; `None` means
    /// auto-derive from `phase2_threshold`/`phase3_threshold`.
    pub active_phase_override: Option<u8>,
    pub phase2_threshold: f64,
    pub phase3_threshold: f64,

    pub min_trade_usd: f64,
    pub max_trade_usd: f64,
    pub max_position_pct: f64,
    pub max_total_exposure_pct: f64,
    pub max_strategy_exposure_pct: f64,
    pub max_daily_drawdown_pct: f64,
    pub max_single_loss_pct: f64,
    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
    pub recovery_trade_count: u32,
    pub recovery_position_multiplier: f64,

    pub order_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_base_secs: f64,

    pub arb_threshold: f64,
    pub slippage_buffer: f64,
    pub min_arb_profit_pct: f64,
    pub min_daily_volume_arb: f64,
    pub estimated_fee_rate: f64,

    pub new_market_scan_interval_secs: u64,
    pub new_market_age_limit_secs: i64,
    pub new_market_size_pct: f64,
    pub high_priority_threshold: f64,
    pub max_new_market_exposure_pct: f64,

    pub min_resolution_edge: f64,
    pub price_buffer_pct: f64,
    pub max_resolution_position_pct: f64,

    pub min_edge_directional: f64,
    pub directional_min_sample: u32,
    pub directional_min_win_rate: f64,
    pub max_concurrent_directional: u32,
    pub max_directional_position_pct: f64,
    pub max_total_directional_pct: f64,
    pub kelly_fraction: f64,

    pub resolution_asset_keywords: Vec<String>,
    pub price_agreement_tolerance_pct: f64,

    pub min_market_volume_usd: f64,

    pub min_starting_balance_usd: f64,

    pub journal_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: true,
            clob_base_url: "https://clob.polymarket.com".to_string(),
            gamma_base_url: "https://gamma-api.polymarket.com".to_string(),
            chain_id: 137,

            scan_interval_secs: 10,
            summary_every_cycles: 30,

            active_phase_override: None,
            phase2_threshold: 250.0,
            phase3_threshold: 500.0,

            min_trade_usd: 2.0,
            max_trade_usd: 100.0,
            max_position_pct: 0.20,
            max_total_exposure_pct: 0.40,
            max_strategy_exposure_pct: 0.30,
            max_daily_drawdown_pct: 0.05,
            max_single_loss_pct: 0.03,
            max_consecutive_losses: 3,
            cooldown_minutes: 30,
            recovery_trade_count: 5,
            recovery_position_multiplier: 0.5,

            order_timeout_secs: 15,
            max_retries: 3,
            retry_backoff_base_secs: 2.0,

            arb_threshold: 0.985,
            slippage_buffer: 0.005,
            min_arb_profit_pct: 0.005,
            min_daily_volume_arb: 500.0,
            estimated_fee_rate: 0.01,

            new_market_scan_interval_secs: 30,
            new_market_age_limit_secs: 900,
            new_market_size_pct: 0.15,
            high_priority_threshold: 0.94,
            max_new_market_exposure_pct: 0.25,

            min_resolution_edge: 0.03,
            price_buffer_pct: 0.005,
            max_resolution_position_pct: 0.20,

            min_edge_directional: 0.10,
            directional_min_sample: 20,
            directional_min_win_rate: 0.50,
            max_concurrent_directional: 3,
            max_directional_position_pct: 0.10,
            max_total_directional_pct: 0.25,
            kelly_fraction: 0.5,

            resolution_asset_keywords: vec!["btc".to_string(), "bitcoin".to_string()],
            price_agreement_tolerance_pct: 0.005,

            min_market_volume_usd: 500.0,

            min_starting_balance_usd: 20.0,

            journal_path: "trades.csv".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let default = Self::default();

        Self {
            dry_run: env_bool("DRY_RUN", default.dry_run),
            clob_base_url: env_string("CLOB_BASE_URL", &default.clob_base_url),
            gamma_base_url: env_string("GAMMA_BASE_URL", &default.gamma_base_url),
            chain_id: env_parse("CHAIN_ID", default.chain_id),

            scan_interval_secs: env_parse("SCAN_INTERVAL_SECS", default.scan_interval_secs),
            summary_every_cycles: env_parse("SUMMARY_EVERY_CYCLES", default.summary_every_cycles),

            active_phase_override: {
                let raw: u8 = env_parse("ACTIVE_PHASE_OVERRIDE", 0u8);
                if (1..=3).contains(&raw) {
                    Some(raw)
                } else {
                    None
                }
            },
            phase2_threshold: env_parse("PHASE2_THRESHOLD", default.phase2_threshold),
            phase3_threshold: env_parse("PHASE3_THRESHOLD", default.phase3_threshold),

            min_trade_usd: env_parse("MIN_TRADE_USD", default.min_trade_usd),
            max_trade_usd: env_parse("MAX_TRADE_USD", default.max_trade_usd),
            max_position_pct: env_parse("MAX_POSITION_PCT", default.max_position_pct),
            max_total_exposure_pct: env_parse(
                "MAX_TOTAL_EXPOSURE_PCT",
                default.max_total_exposure_pct,
            ),
            max_strategy_exposure_pct: env_parse(
                "MAX_STRATEGY_EXPOSURE_PCT",
                default.max_strategy_exposure_pct,
            ),
            max_daily_drawdown_pct: env_parse(
                "MAX_DAILY_DRAWDOWN_PCT",
                default.max_daily_drawdown_pct,
            ),
            max_single_loss_pct: env_parse("MAX_SINGLE_LOSS_PCT", default.max_single_loss_pct),
            max_consecutive_losses: env_parse(
                "MAX_CONSECUTIVE_LOSSES",
                default.max_consecutive_losses,
            ),
            cooldown_minutes: env_parse("COOLDOWN_MINUTES", default.cooldown_minutes),
            recovery_trade_count: env_parse("RECOVERY_TRADE_COUNT", default.recovery_trade_count),
            recovery_position_multiplier: env_parse(
                "RECOVERY_POSITION_MULTIPLIER",
                default.recovery_position_multiplier,
            ),

            order_timeout_secs: env_parse("ORDER_TIMEOUT_SECONDS", default.order_timeout_secs),
            max_retries: env_parse("MAX_RETRIES", default.max_retries),
            retry_backoff_base_secs: env_parse(
                "RETRY_BACKOFF_BASE",
                default.retry_backoff_base_secs,
            ),

            arb_threshold: env_parse("ARB_THRESHOLD", default.arb_threshold),
            slippage_buffer: env_parse("SLIPPAGE_BUFFER", default.slippage_buffer),
            min_arb_profit_pct: env_parse("MIN_ARB_PROFIT_PCT", default.min_arb_profit_pct),
            min_daily_volume_arb: env_parse(
                "MIN_DAILY_VOLUME_ARB",
                default.min_daily_volume_arb,
            ),
            estimated_fee_rate: env_parse("ESTIMATED_FEE_RATE", default.estimated_fee_rate),

            new_market_scan_interval_secs: env_parse(
                "NEW_MARKET_SCAN_INTERVAL",
                default.new_market_scan_interval_secs,
            ),
            new_market_age_limit_secs: env_parse(
                "NEW_MARKET_AGE_LIMIT",
                default.new_market_age_limit_secs,
            ),
            new_market_size_pct: env_parse("NEW_MARKET_SIZE_PCT", default.new_market_size_pct),
            high_priority_threshold: env_parse(
                "HIGH_PRIORITY_THRESHOLD",
                default.high_priority_threshold,
            ),
            max_new_market_exposure_pct: env_parse(
                "MAX_NEW_MARKET_EXPOSURE_PCT",
                default.max_new_market_exposure_pct,
            ),

            min_resolution_edge: env_parse(
                "MIN_RESOLUTION_EDGE",
                default.min_resolution_edge,
            ),
            price_buffer_pct: env_parse("PRICE_BUFFER_PCT", default.price_buffer_pct),
            max_resolution_position_pct: env_parse(
                "MAX_RESOLUTION_POSITION_PCT",
                default.max_resolution_position_pct,
            ),

            min_edge_directional: env_parse(
                "MIN_EDGE_DIRECTIONAL",
                default.min_edge_directional,
            ),
            directional_min_sample: env_parse(
                "DIRECTIONAL_MIN_SAMPLE",
                default.directional_min_sample,
            ),
            directional_min_win_rate: env_parse(
                "DIRECTIONAL_MIN_WIN_RATE",
                default.directional_min_win_rate,
            ),
            max_concurrent_directional: env_parse(
                "MAX_CONCURRENT_DIRECTIONAL",
                default.max_concurrent_directional,
            ),
            max_directional_position_pct: env_parse(
                "MAX_DIRECTIONAL_POSITION_PCT",
                default.max_directional_position_pct,
            ),
            max_total_directional_pct: env_parse(
                "MAX_TOTAL_DIRECTIONAL_PCT",
                default.max_total_directional_pct,
            ),
            kelly_fraction: env_parse("KELLY_FRACTION", default.kelly_fraction),

            resolution_asset_keywords: {
                let raw: Vec<String> = env_string("RESOLUTION_ASSET_KEYWORDS", "")
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if raw.is_empty() {
                    default.resolution_asset_keywords.clone()
                } else {
                    raw
                }
            },
            price_agreement_tolerance_pct: env_parse(
                "PRICE_AGREEMENT_TOLERANCE_PCT",
                default.price_agreement_tolerance_pct,
            ),

            min_market_volume_usd: env_parse("MIN_MARKET_VOLUME_USD", default.min_market_volume_usd),

            min_starting_balance_usd: env_parse(
                "MIN_STARTING_BALANCE_USD",
                default.min_starting_balance_usd,
            ),

            journal_path: env_string("JOURNAL_PATH", &default.journal_path),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert!(c.dry_run);
        assert!(c.min_trade_usd < c.max_trade_usd);
        assert!(c.max_position_pct < c.max_total_exposure_pct);
    }

    #[test]
    fn env_bool_accepts_common_truthy_values() {
        std::env::set_var("CONFIG_TEST_BOOL", "true");
        assert!(env_bool("CONFIG_TEST_BOOL", false));
        std::env::set_var("CONFIG_TEST_BOOL", "0");
        assert!(!env_bool("CONFIG_TEST_BOOL", true));
        std::env::remove_var("CONFIG_TEST_BOOL");
    }
}

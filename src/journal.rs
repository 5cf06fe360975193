//! Append-only CSV trade journal and periodic summary emission.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::position_ledger::TradeRecord;

const CSV_COLUMNS: &[&str] = &[
    "timestamp",
    "datetime_utc",
    "strategy",
    "market_name",
    "side",
    "entry_price",
    "exit_price",
    "size_usd",
    "pnl_usd",
    "pnl_pct",
    "balance_after",
    "phase",
];

const MARKET_NAME_MAX_LEN: usize = 100;

struct SummaryState {
    last_daily_emit: Option<DateTime<Utc>>,
    last_weekly_emit: Option<DateTime<Utc>>,
    start_balance: f64,
}

/// Owns the on-disk trade journal. Writes a header only when the file is
/// absent or empty, and tracks UTC day/week boundaries for periodic
/// summary emission.
pub struct Journal {
    path: PathBuf,
    summary: Mutex<SummaryState>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>, start_balance: f64) -> Self {
        Self {
            path: path.into(),
            summary: Mutex::new(SummaryState {
                last_daily_emit: None,
                last_weekly_emit: None,
                start_balance,
            }),
        }
    }

    fn needs_header(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true)
    }

    pub fn record(&self, record: &TradeRecord) -> Result<()> {
        let needs_header = self.needs_header();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal at {:?}", self.path))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(CSV_COLUMNS)?;
        }

        let market_name: String = record.market_name.chars().take(MARKET_NAME_MAX_LEN).collect();

        writer.write_record(&[
            record.timestamp.timestamp().to_string(),
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.strategy.clone(),
            market_name,
            record.side.clone(),
            format!("{:.6}", record.entry_price),
            format!("{:.6}", record.exit_price),
            format!("{:.2}", record.size_usd),
            format!("{:.4}", record.pnl_usd),
            format!("{:.4}", record.pnl_pct),
            format!("{:.2}", record.balance_after),
            record.phase.to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    /// Emits a daily summary the first time this is called on or after a
    /// UTC day boundary, and a weekly summary every 7 such days.
    pub fn check_daily_summary(&self, history: &[TradeRecord], current_balance: f64) {
        let now = Utc::now();
        let mut state = self.summary.lock();

        let day_elapsed = match state.last_daily_emit {
            Some(last) => now.date_naive() != last.date_naive(),
            None => true,
        };
        if !day_elapsed {
            return;
        }

        self.emit_daily_summary(history, current_balance, now);
        state.last_daily_emit = Some(now);

        let week_elapsed = match state.last_weekly_emit {
            Some(last) => (now - last).num_days() >= 7,
            None => true,
        };
        if week_elapsed {
            self.emit_weekly_summary(history, current_balance, state.start_balance, now);
            state.last_weekly_emit = Some(now);
        }
    }

    fn emit_daily_summary(&self, history: &[TradeRecord], balance: f64, now: DateTime<Utc>) {
        let today: Vec<&TradeRecord> = history
            .iter()
            .filter(|t| t.timestamp.date_naive() == now.date_naive())
            .collect();
        let pnl: f64 = today.iter().map(|t| t.pnl_usd).sum();
        let best = today.iter().max_by(|a, b| a.pnl_usd.total_cmp(&b.pnl_usd));
        let worst = today.iter().min_by(|a, b| a.pnl_usd.total_cmp(&b.pnl_usd));
        info!(
            trades = today.len(),
            pnl_usd = pnl,
            balance,
            best_pnl = best.map(|t| t.pnl_usd),
            worst_pnl = worst.map(|t| t.pnl_usd),
            "daily summary"
        );
    }

    fn emit_weekly_summary(
        &self,
        history: &[TradeRecord],
        balance: f64,
        start_balance: f64,
        now: DateTime<Utc>,
    ) {
        let week_ago = now - chrono::Duration::days(7);
        let week: Vec<&TradeRecord> =
            history.iter().filter(|t| t.timestamp >= week_ago).collect();
        let pnl: f64 = week.iter().map(|t| t.pnl_usd).sum();
        let total_return_pct = if start_balance > 0.0 {
            (balance - start_balance) / start_balance
        } else {
            0.0
        };
        info!(
            trades = week.len(),
            pnl_usd = pnl,
            total_return_pct,
            "weekly summary"
        );
    }
}

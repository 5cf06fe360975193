//! The active phase (1/2/3) shared between the scheduler and every
//! strategy. Updated once per cycle by the scheduler's phase derivation;
//! read by strategies only to stamp [`crate::position_ledger::TradeRecord`]
//! at close time, so a relaxed atomic is sufficient — no ordering is
//! required relative to any other shared state.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Default)]
pub struct CurrentPhase(AtomicU8);

impl CurrentPhase {
    pub fn new(phase: u8) -> Self {
        Self(AtomicU8::new(phase))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, phase: u8) {
        self.0.store(phase, Ordering::Relaxed);
    }
}

/// Pure function of `(balance, override)`: when `manual_override` is 1, 2,
/// or 3 it wins outright; otherwise the phase is a monotonic step function
/// of balance with the two configured breakpoints.
pub fn determine_phase(
    balance: f64,
    manual_override: Option<u8>,
    phase2_threshold: f64,
    phase3_threshold: f64,
) -> u8 {
    if let Some(p) = manual_override {
        if (1..=3).contains(&p) {
            return p;
        }
    }
    if balance >= phase3_threshold {
        3
    } else if balance >= phase2_threshold {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_override_wins_regardless_of_balance() {
        assert_eq!(determine_phase(0.0, Some(3), 250.0, 500.0), 3);
    }

    #[test]
    fn auto_phase_steps_on_thresholds() {
        assert_eq!(determine_phase(100.0, None, 250.0, 500.0), 1);
        assert_eq!(determine_phase(250.0, None, 250.0, 500.0), 2);
        assert_eq!(determine_phase(500.0, None, 250.0, 500.0), 3);
        assert_eq!(determine_phase(499.99, None, 250.0, 500.0), 2);
    }

    #[test]
    fn out_of_range_override_falls_back_to_auto() {
        assert_eq!(determine_phase(600.0, Some(0), 250.0, 500.0), 3);
    }

    #[test]
    fn current_phase_cell_reads_back_stored_value() {
        let cell = CurrentPhase::new(1);
        cell.set(2);
        assert_eq!(cell.get(), 2);
    }
}

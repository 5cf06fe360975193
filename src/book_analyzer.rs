//! Order book depth walking and fill-cost estimation.

use serde::{Deserialize, Serialize};

/// A single (price, size) level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// One side of an order book, as returned by a venue. Bids are expected in
/// descending price order, asks in ascending price order; callers that
/// receive an unsorted snapshot should sort before passing it in here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookSide {
    pub levels: Vec<PriceLevel>,
}

impl OrderBookSide {
    pub fn new(levels: Vec<PriceLevel>) -> Self {
        Self { levels }
    }
}

/// Result of walking one side of a book to fill a target size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillEstimate {
    pub average_price: f64,
    pub total_filled: f64,
    pub total_cost: f64,
    pub levels_consumed: usize,
    pub fully_fillable: bool,
}

fn walk(levels: &[PriceLevel], target_size: f64) -> FillEstimate {
    let mut remaining = target_size;
    let mut total_cost = 0.0;
    let mut total_filled = 0.0;
    let mut levels_consumed = 0;

    for level in levels {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(level.size);
        total_cost += take * level.price;
        total_filled += take;
        remaining -= take;
        levels_consumed += 1;
    }

    let fully_fillable = remaining <= 1e-9;
    let average_price = if total_filled > 0.0 {
        total_cost / total_filled
    } else {
        0.0
    };

    FillEstimate {
        average_price,
        total_filled,
        total_cost,
        levels_consumed,
        fully_fillable,
    }
}

/// Walk the ask side to estimate the cost of buying `target_size` shares.
pub fn walk_asks(asks: &OrderBookSide, target_size: f64) -> FillEstimate {
    walk(&asks.levels, target_size)
}

/// Walk the bid side to estimate the proceeds of selling `target_size` shares.
pub fn walk_bids(bids: &OrderBookSide, target_size: f64) -> FillEstimate {
    walk(&bids.levels, target_size)
}

/// Cost of simultaneously buying `size` shares of YES and `size` shares of
/// NO, or `None` if either side cannot fully fill that size.
pub fn combined_fill_cost(
    yes_asks: &OrderBookSide,
    no_asks: &OrderBookSide,
    size: f64,
) -> Option<f64> {
    let yes = walk_asks(yes_asks, size);
    let no = walk_asks(no_asks, size);
    if yes.fully_fillable && no.fully_fillable {
        Some(yes.total_cost + no.total_cost)
    } else {
        None
    }
}

pub fn best_ask_price(asks: &OrderBookSide) -> Option<f64> {
    asks.levels.first().map(|l| l.price)
}

pub fn best_bid_price(bids: &OrderBookSide) -> Option<f64> {
    bids.levels.first().map(|l| l.price)
}

/// Total size available at or better than `price` on the given side.
/// `better` means lower for asks, higher for bids — pass the side's own
/// natural ordering in `levels` and this simply sums from the front while
/// the level price stays within `price` of the best price.
pub fn liquidity_at_or_below(levels: &OrderBookSide, price: f64, is_ask: bool) -> f64 {
    levels
        .levels
        .iter()
        .filter(|l| if is_ask { l.price <= price } else { l.price >= price })
        .map(|l| l.size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(levels: &[(f64, f64)]) -> OrderBookSide {
        OrderBookSide::new(
            levels
                .iter()
                .map(|&(price, size)| PriceLevel { price, size })
                .collect(),
        )
    }

    #[test]
    fn walk_asks_fully_fills_within_one_level() {
        let asks = side(&[(0.40, 100.0), (0.41, 200.0)]);
        let est = walk_asks(&asks, 50.0);
        assert!(est.fully_fillable);
        assert_eq!(est.levels_consumed, 1);
        assert!((est.average_price - 0.40).abs() < 1e-9);
        assert!((est.total_cost - 20.0).abs() < 1e-9);
    }

    #[test]
    fn walk_asks_spans_multiple_levels() {
        let asks = side(&[(0.40, 50.0), (0.42, 50.0)]);
        let est = walk_asks(&asks, 75.0);
        assert!(est.fully_fillable);
        assert_eq!(est.levels_consumed, 2);
        let expected_cost = 50.0 * 0.40 + 25.0 * 0.42;
        assert!((est.total_cost - expected_cost).abs() < 1e-9);
    }

    #[test]
    fn walk_asks_reports_partial_fill_when_book_too_thin() {
        let asks = side(&[(0.40, 10.0)]);
        let est = walk_asks(&asks, 100.0);
        assert!(!est.fully_fillable);
        assert_eq!(est.total_filled, 10.0);
    }

    #[test]
    fn combined_fill_cost_requires_both_sides_fillable() {
        let yes = side(&[(0.60, 100.0)]);
        let no = side(&[(0.35, 5.0)]);
        assert_eq!(combined_fill_cost(&yes, &no, 20.0), None);

        let no_deep = side(&[(0.35, 100.0)]);
        let cost = combined_fill_cost(&yes, &no_deep, 20.0).unwrap();
        assert!((cost - (20.0 * 0.60 + 20.0 * 0.35)).abs() < 1e-9);
    }

    #[test]
    fn best_prices_read_front_of_book() {
        let asks = side(&[(0.40, 10.0), (0.41, 10.0)]);
        let bids = side(&[(0.38, 10.0), (0.37, 10.0)]);
        assert_eq!(best_ask_price(&asks), Some(0.40));
        assert_eq!(best_bid_price(&bids), Some(0.38));
        assert_eq!(best_ask_price(&OrderBookSide::default()), None);
    }
}

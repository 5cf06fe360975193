//! Shared helpers for threshold-market questions: strike/direction parsing
//! and the normal CDF used by the directional model.

use statrs::function::erf::erf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeQuestion {
    pub strike: f64,
    pub direction: Direction,
}

/// Parses a threshold-market question like "Will BTC be above $65,000 by
/// Friday?" into a strike price and direction. Recognizes "$65,000",
/// "$65000", "$65k", and "$65.5k" strike formats, and
/// above/over/greater vs below/under/less direction keywords.
///
/// Returns `None` if no recognizable strike or direction is present.
pub fn parse_strike_question(question: &str) -> Option<StrikeQuestion> {
    let lower = question.to_lowercase();

    let direction = if contains_any(&lower, &["above", "over", "greater than", "exceeds"]) {
        Direction::Above
    } else if contains_any(&lower, &["below", "under", "less than"]) {
        Direction::Below
    } else {
        return None;
    };

    let strike = extract_strike(&lower)?;

    Some(StrikeQuestion { strike, direction })
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Scans for the first `$<number>[k]` token and returns its value, applying
/// a 1000x multiplier when the number is immediately followed by `k`.
fn extract_strike(lower: &str) -> Option<f64> {
    let bytes = lower.as_bytes();
    let dollar_pos = lower.find('$')?;

    let mut end = dollar_pos + 1;
    let mut digits = String::new();
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_digit() || c == '.' {
            digits.push(c);
            end += 1;
        } else if c == ',' {
            end += 1;
        } else {
            break;
        }
    }
    if digits.is_empty() {
        return None;
    }

    let mut value: f64 = digits.parse().ok()?;
    if end < bytes.len() && (bytes[end] as char) == 'k' {
        value *= 1000.0;
    }
    Some(value)
}

/// Standard normal cumulative distribution function, via the error
/// function identity `Φ(x) = 0.5 * (1 + erf(x / sqrt(2)))`.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

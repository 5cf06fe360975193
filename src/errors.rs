use std::fmt;

/// Error taxonomy categories a caller may need to match on directly.
/// Everything else propagates as a plain `anyhow::Error` with `.context(...)`.
#[derive(Debug)]
pub enum EngineError {
    /// Venue call failed for a reason expected to clear on retry (timeout, 5xx, rate limit).
    TransientVenue(String),
    /// One or both sides of a book could not fully fill the requested size.
    BookInsufficient { token_id: String, requested: f64 },
    /// The catalog snapshot is older than callers can trust for this decision.
    CatalogStale,
    /// Two price sources disagree beyond the configured tolerance.
    OracleDisagreement { a: f64, b: f64, tolerance_pct: f64 },
    /// A market question or wire payload could not be parsed into a typed value.
    ParseFailure(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::TransientVenue(msg) => write!(f, "transient venue error: {msg}"),
            EngineError::BookInsufficient { token_id, requested } => write!(
                f,
                "book for token {token_id} cannot fill requested size {requested}"
            ),
            EngineError::CatalogStale => write!(f, "market catalog snapshot is stale"),
            EngineError::OracleDisagreement { a, b, tolerance_pct } => write!(
                f,
                "price oracle sources disagree: {a} vs {b} (tolerance {tolerance_pct})"
            ),
            EngineError::ParseFailure(msg) => write!(f, "parse failure: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

use crate::domain::types::Side;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the candle store and indicator kernel.
/// All of these skip the symbol for the current tick; none are fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Stale candles for {symbol}: newest is {age_secs}s old, limit {limit_secs}s")]
    Stale {
        symbol: String,
        age_secs: i64,
        limit_secs: i64,
    },

    #[error("Insufficient data: need {required} candles, have {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Non-finite value in series for {symbol}")]
    NotANumber { symbol: String },

    #[error("Gap in candle series for {symbol} at t={at}")]
    GapDetected { symbol: String, at: i64 },
}

/// Errors surfaced by the exchange port. Transient kinds carry the
/// server-provided backoff, which callers must honour.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Rate limited by exchange: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Unknown symbol: {symbol}")]
    SymbolUnknown { symbol: String },

    #[error("Network error: {reason}")]
    Network { reason: String },
}

/// Errors surfaced by the notification port.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notification flood control: retry after {retry_after_secs}s")]
    Flood { retry_after_secs: u64 },

    #[error("Delivery failed: {reason}")]
    DeliveryFailed { reason: String },
}

/// Contract violations on generated candidates. Logged with full context
/// and dropped; never emitted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CandidateError {
    #[error(
        "Invalid levels for {symbol} {side}: entry={entry} sl={sl} tp1={tp1} tp2={tp2}"
    )]
    InvalidLevels {
        symbol: String,
        side: Side,
        entry: Decimal,
        sl: Decimal,
        tp1: Decimal,
        tp2: Decimal,
    },

    #[error("Composite undefined: only {evaluated} of 4 strategies could be scored")]
    InsufficientSignals { evaluated: usize },
}

/// Per-symbol tick failures handled at the orchestrator boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TickError {
    #[error("Tick deadline exceeded for {symbol} after {budget_secs}s")]
    DeadlineExceeded { symbol: String, budget_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stale_formatting() {
        let err = DataError::Stale {
            symbol: "BTCUSDT".to_string(),
            age_secs: 7200,
            limit_secs: 3600,
        };
        let msg = err.to_string();
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("7200"));
    }

    #[test]
    fn test_invalid_levels_formatting() {
        let err = CandidateError::InvalidLevels {
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry: dec!(2500),
            sl: dec!(2510),
            tp1: dec!(2527),
            tp2: dec!(2554),
        };
        let msg = err.to_string();
        assert!(msg.contains("ETHUSDT"));
        assert!(msg.contains("LONG"));
        assert!(msg.contains("2510"));
    }

    #[test]
    fn test_rate_limited_carries_backoff() {
        let err = ExchangeError::RateLimited {
            retry_after_secs: 30,
        };
        assert!(err.to_string().contains("30"));
    }
}

use crate::domain::regime::MarketRegime;
use crate::domain::types::{EmittedSignal, PatternType, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Tp1Partial,
    ClosedTp,
    ClosedSl,
    ClosedManual,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PositionStatus::ClosedTp | PositionStatus::ClosedSl | PositionStatus::ClosedManual
        )
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Tp1Partial => write!(f, "TP1_PARTIAL"),
            PositionStatus::ClosedTp => write!(f, "CLOSED_TP"),
            PositionStatus::ClosedSl => write!(f, "CLOSED_SL"),
            PositionStatus::ClosedManual => write!(f, "CLOSED_MANUAL"),
        }
    }
}

impl FromStr for PositionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "TP1_PARTIAL" => Ok(PositionStatus::Tp1Partial),
            "CLOSED_TP" => Ok(PositionStatus::ClosedTp),
            "CLOSED_SL" => Ok(PositionStatus::ClosedSl),
            "CLOSED_MANUAL" => Ok(PositionStatus::ClosedManual),
            _ => anyhow::bail!("Unknown position status: {}", s),
        }
    }
}

/// Signal metadata carried through the position so the outcome recorder
/// can attribute the result without re-reading the emitted signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAttribution {
    pub pattern: PatternType,
    pub raw_score: f64,
    pub regime_at_gen: MarketRegime,
    pub composite_score: f64,
    pub composite_confidence: f64,
    pub volume_usd: f64,
    pub volatility_pct: f64,
}

/// A synthetic position tracked per (user, signal). Mutated exclusively by
/// the lifecycle manager; everyone else sees clones.
///
/// Invariants:
/// - `current_sl` only ever advances in the position's favour.
/// - `status == Tp1Partial` iff `tp1_hit && remaining_size > 0`.
/// - Terminal when `remaining_size == 0` or `status.is_terminal()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub signal_id: Uuid,
    pub user_id: i64,
    pub symbol: String,
    pub side: Side,
    pub entry: Decimal,
    pub initial_size: Decimal,
    pub remaining_size: Decimal,
    pub current_sl: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub tp1_hit: bool,
    pub trailing_active: bool,
    /// Most favourable price seen since trailing armed (highest for LONG,
    /// lowest for SHORT).
    pub high_water_mark: Decimal,
    /// Size-weighted return in percent realized by closed legs so far.
    pub realized_return_pct: Decimal,
    pub opened_at: i64,
    pub last_update: i64,
    pub status: PositionStatus,
    pub message_ref: Option<String>,
    pub attribution: SignalAttribution,
}

impl Position {
    /// Opens a position from an accepted signal.
    pub fn from_signal(signal: &EmittedSignal, volume_usd: f64, opened_at: i64) -> Self {
        Self {
            signal_id: signal.id,
            user_id: signal.user_id,
            symbol: signal.candidate.symbol.clone(),
            side: signal.candidate.side,
            entry: signal.candidate.entry,
            initial_size: signal.size_usdt,
            remaining_size: signal.size_usdt,
            current_sl: signal.sl,
            tp1: signal.tp1,
            tp2: signal.tp2,
            tp1_hit: false,
            trailing_active: false,
            high_water_mark: signal.candidate.entry,
            realized_return_pct: Decimal::ZERO,
            opened_at,
            last_update: opened_at,
            status: PositionStatus::Open,
            message_ref: signal.message_ref.clone(),
            attribution: SignalAttribution {
                pattern: signal.candidate.pattern,
                raw_score: signal.candidate.raw_score,
                regime_at_gen: signal.candidate.regime_at_gen,
                composite_score: signal.candidate.composite_score,
                composite_confidence: signal.candidate.composite_confidence,
                volume_usd,
                volatility_pct: signal.candidate.volatility_pct,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || self.remaining_size.is_zero()
    }

    /// Signed return of `price` against entry, in percent. Positive means
    /// the position is in profit, for both sides.
    pub fn unrealized_return_pct(&self, price: Decimal) -> Decimal {
        if self.entry.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry) / self.entry * dec!(100) * self.side.sign()
    }

    /// True if `price` is at or beyond the given favourable level.
    pub fn reached(&self, price: Decimal, level: Decimal) -> bool {
        match self.side {
            Side::Long => price >= level,
            Side::Short => price <= level,
        }
    }

    /// True if `price` is at or beyond the stop.
    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.current_sl,
            Side::Short => price >= self.current_sl,
        }
    }

    /// Accumulates realized return for a closed fraction of the initial
    /// size. Call before reducing `remaining_size`.
    pub fn realize_leg(&mut self, closed_size: Decimal, exit_price: Decimal) {
        if self.initial_size.is_zero() || self.entry.is_zero() {
            return;
        }
        let leg_return =
            (exit_price - self.entry) / self.entry * dec!(100) * self.side.sign();
        let fraction = closed_size / self.initial_size;
        self.realized_return_pct += leg_return * fraction;
    }
}

/// Lifecycle transitions observed during one evaluation of one position.
/// Consumed by the dispatcher (user-facing updates) and the outcome
/// recorder (terminal transitions).
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    TrailingArmed {
        stop: Decimal,
    },
    StopAdvanced {
        from: Decimal,
        to: Decimal,
    },
    PartialTakeProfit {
        price: Decimal,
        closed_size: Decimal,
        new_sl: Decimal,
    },
    Closed {
        status: PositionStatus,
        price: Decimal,
    },
}

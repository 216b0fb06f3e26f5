use crate::domain::position::Position;
use crate::domain::regime::MarketRegime;
use crate::domain::types::{PatternType, Side};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable learning record, written exactly once per fully-closed
/// position. Keyed by `signal_id` for idempotence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub signal_id: Uuid,
    pub user_id: i64,
    pub symbol: String,
    pub pattern: PatternType,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl_pct: f64,
    pub is_winner: bool,
    pub duration_hours: f64,
    pub ai_score: f64,
    pub market_regime: MarketRegime,
    pub composite_score: f64,
    pub composite_confidence: f64,
    pub volume_usd: f64,
    pub volatility_pct: f64,
    pub closed_at: i64,
}

impl TradeResult {
    /// Builds the record from a terminal position. The position's
    /// size-weighted realized return is the trade's pnl.
    pub fn from_position(position: &Position, exit_price: Decimal, closed_at: i64) -> Self {
        let pnl_pct = position.realized_return_pct.to_f64().unwrap_or(0.0);
        let duration_hours = (closed_at - position.opened_at).max(0) as f64 / 3600.0;
        Self {
            signal_id: position.signal_id,
            user_id: position.user_id,
            symbol: position.symbol.clone(),
            pattern: position.attribution.pattern,
            side: position.side,
            entry_price: position.entry,
            exit_price,
            pnl_pct,
            is_winner: pnl_pct > 0.0,
            duration_hours,
            ai_score: position.attribution.raw_score,
            market_regime: position.attribution.regime_at_gen,
            composite_score: position.attribution.composite_score,
            composite_confidence: position.attribution.composite_confidence,
            volume_usd: position.attribution.volume_usd,
            volatility_pct: position.attribution.volatility_pct,
            closed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{PositionStatus, SignalAttribution};
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_position_uses_weighted_return() {
        let mut position = Position {
            signal_id: Uuid::new_v4(),
            user_id: 9,
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry: dec!(2500),
            initial_size: dec!(100),
            remaining_size: dec!(100),
            current_sl: dec!(2475),
            tp1: dec!(2540),
            tp2: dec!(2600),
            tp1_hit: false,
            trailing_active: false,
            high_water_mark: dec!(2500),
            realized_return_pct: Decimal::ZERO,
            opened_at: 0,
            last_update: 0,
            status: PositionStatus::Open,
            message_ref: None,
            attribution: SignalAttribution {
                pattern: PatternType::EmaCross,
                raw_score: 42.0,
                regime_at_gen: MarketRegime::BullTrend,
                composite_score: 0.8,
                composite_confidence: 0.9,
                volume_usd: 5e6,
                volatility_pct: 1.5,
            },
        };
        position.realize_leg(dec!(50), dec!(2540));
        position.remaining_size -= dec!(50);
        position.realize_leg(dec!(50), dec!(2600));
        position.remaining_size = Decimal::ZERO;
        position.status = PositionStatus::ClosedTp;

        let result = TradeResult::from_position(&position, dec!(2600), 7200);
        assert!((result.pnl_pct - 2.8).abs() < 1e-9);
        assert!(result.is_winner);
        assert!((result.duration_hours - 2.0).abs() < 1e-9);
        assert_eq!(result.market_regime, MarketRegime::BullTrend);
    }

    #[test]
    fn test_loser_flagged() {
        let mut position = Position {
            signal_id: Uuid::new_v4(),
            user_id: 9,
            symbol: "SOLUSDT".to_string(),
            side: Side::Short,
            entry: dec!(100),
            initial_size: dec!(50),
            remaining_size: dec!(50),
            current_sl: dec!(103),
            tp1: dec!(97),
            tp2: dec!(94),
            tp1_hit: false,
            trailing_active: false,
            high_water_mark: dec!(100),
            realized_return_pct: Decimal::ZERO,
            opened_at: 0,
            last_update: 0,
            status: PositionStatus::Open,
            message_ref: None,
            attribution: SignalAttribution {
                pattern: PatternType::Breakout,
                raw_score: 30.0,
                regime_at_gen: MarketRegime::BearTrend,
                composite_score: 0.6,
                composite_confidence: 0.5,
                volume_usd: 1e6,
                volatility_pct: 3.0,
            },
        };
        position.realize_leg(dec!(50), dec!(103));
        position.remaining_size = Decimal::ZERO;
        position.status = PositionStatus::ClosedSl;

        let result = TradeResult::from_position(&position, dec!(103), 3600);
        assert!(result.pnl_pct < 0.0);
        assert!(!result.is_winner);
    }
}

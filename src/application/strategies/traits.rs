use crate::application::market_data::IndicatorSet;
use crate::domain::types::{Candle, PatternType, Side};
use rust_decimal::Decimal;

/// Read-only view a detector sees for one symbol on one tick.
pub struct DetectionContext<'a> {
    pub symbol: &'a str,
    pub candles: &'a [Candle],
    pub ind: &'a IndicatorSet,
    pub current_price: Decimal,
}

/// A candidate produced by a single detector. `raw_score` is on the
/// 0-100 point scale the score gate thresholds against; `confidence`
/// is the detector's own conviction in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSignal {
    pub side: Side,
    pub entry: Decimal,
    pub pattern: PatternType,
    pub raw_score: f64,
    pub confidence: f64,
}

/// A pure pattern detector. Stateless: everything it needs arrives in the
/// context, and the same context always yields the same answer.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal>;
}

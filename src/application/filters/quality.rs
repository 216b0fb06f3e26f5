use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::application::market_data::IndicatorSet;
use crate::domain::types::{Candle, Side};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

/// Composite quality of a candidate in [0, 1]: pattern confidence,
/// proximity to a structural level, symbol health and volume quality.
/// Computed once per candidate by the tick worker and thresholded by the
/// quality gate.
pub fn quality_score(
    pattern_confidence: f64,
    side: Side,
    entry: f64,
    candles: &[Candle],
    ind: &IndicatorSet,
) -> f64 {
    let level = level_proximity(side, entry, candles);
    let health = symbol_health(ind);
    let volume = volume_quality(ind);
    (0.4 * pattern_confidence + 0.2 * level + 0.2 * health + 0.2 * volume).clamp(0.0, 1.0)
}

/// Entries near the favourable edge of the recent range score high:
/// buying near support, selling near resistance.
fn level_proximity(side: Side, entry: f64, candles: &[Candle]) -> f64 {
    const LOOKBACK: usize = 50;
    if candles.len() < 2 || entry <= 0.0 {
        return 0.5;
    }
    let window = &candles[candles.len().saturating_sub(LOOKBACK)..];
    let high = window.iter().filter_map(|c| c.high.to_f64()).fold(f64::MIN, f64::max);
    let low = window.iter().filter_map(|c| c.low.to_f64()).fold(f64::MAX, f64::min);
    if high <= low {
        return 0.5;
    }
    let position = ((entry - low) / (high - low)).clamp(0.0, 1.0);
    match side {
        Side::Long => 1.0 - position,
        Side::Short => position,
    }
}

/// Penalizes symbols printing outlier returns; a clean tape scores 1.
fn symbol_health(ind: &IndicatorSet) -> f64 {
    (1.0 - ind.last_return_zscore.abs() / 4.0).clamp(0.0, 1.0)
}

/// Participation vs the rolling mean, saturating at 2x.
fn volume_quality(ind: &IndicatorSet) -> f64 {
    if ind.volume.mean <= 0.0 {
        return 0.0;
    }
    (ind.volume.last / ind.volume.mean / 2.0).clamp(0.0, 1.0)
}

/// Gate 9: quality floor plus the composite-confidence floor. Both are
/// inclusive: a candidate exactly at the boundary passes.
pub struct QualityGate;

#[async_trait]
impl SignalGate for QualityGate {
    fn name(&self) -> &'static str {
        "quality_score"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.candidate.quality_score < ctx.params.quality_min {
            return GateDecision::Block(BlockReason::QualityBelowMin);
        }
        if ctx.candidate.composite_confidence < ctx.params.min_composite_confidence {
            return GateDecision::Block(BlockReason::ConfidenceBelowMin);
        }
        GateDecision::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::filters::GateContext;
    use crate::application::strategies::testkit::{ramp_candles, set_from};
    use crate::config::ScoringConfig;
    use crate::domain::parameters::ParameterSnapshot;
    use crate::domain::regime::{MarketRegime, RegimeSnapshot};
    use crate::domain::types::{Interval, PatternType, SignalCandidate};
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_near_low_scores_higher_than_near_high() {
        let candles = ramp_candles(80, 100.0, 0.5);
        let low_entry = 105.0;
        let high_entry = 138.0;
        let near_low = level_proximity(Side::Long, low_entry, &candles);
        let near_high = level_proximity(Side::Long, high_entry, &candles);
        assert!(near_low > near_high);
    }

    #[test]
    fn test_quality_blend_bounded() {
        let candles = ramp_candles(80, 100.0, 0.5);
        let ind = set_from(&candles);
        let q = quality_score(0.9, Side::Long, 120.0, &candles, &ind);
        assert!((0.0..=1.0).contains(&q));
    }

    #[test]
    fn test_symbol_health_penalizes_outliers() {
        let candles = ramp_candles(80, 100.0, 0.5);
        let mut ind = set_from(&candles);
        ind.last_return_zscore = 0.2;
        let clean = symbol_health(&ind);
        ind.last_return_zscore = 3.8;
        let dirty = symbol_health(&ind);
        assert!(clean > dirty);
    }

    fn gate_candidate(quality: f64, confidence: f64) -> SignalCandidate {
        SignalCandidate {
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry: dec!(2500),
            pattern: PatternType::EmaCross,
            raw_score: 40.0,
            regime_at_gen: MarketRegime::LowVolRange,
            composite_score: 0.7,
            composite_confidence: confidence,
            quality_score: quality,
            pattern_confidence: 0.7,
            atr: dec!(12),
            volatility_pct: 2.0,
            candle_t: 0,
        }
    }

    #[tokio::test]
    async fn test_gate_boundaries_inclusive() {
        let candles = ramp_candles(80, 100.0, 0.5);
        let ind = set_from(&candles);
        let regime = RegimeSnapshot::new(MarketRegime::LowVolRange, 0.8, 0);
        let params = ParameterSnapshot::baseline(15.0, 25.0, 0.55, 0.35);
        let scoring = ScoringConfig::default();

        let run = |candidate: SignalCandidate| {
            let regime = regime;
            let params = params.clone();
            let scoring = scoring.clone();
            let candles = candles.clone();
            let ind = ind.clone();
            async move {
                let ctx = GateContext {
                    user_id: 1,
                    candidate: &candidate,
                    candles: &candles,
                    ind: &ind,
                    htf_candles: &[],
                    regime: &regime,
                    params: &params,
                    scoring: &scoring,
                    interval: Interval::H1,
                    now: candles.last().unwrap().timestamp,
                };
                QualityGate.evaluate(&ctx).await
            }
        };

        // Exactly at both floors passes.
        let decision = run(gate_candidate(0.55, 0.35)).await;
        assert_eq!(decision, GateDecision::Pass);

        // A hair under either floor blocks with the specific reason.
        let decision = run(gate_candidate(0.549, 0.8)).await;
        assert_eq!(decision, GateDecision::Block(BlockReason::QualityBelowMin));

        let decision = run(gate_candidate(0.8, 0.349)).await;
        assert_eq!(
            decision,
            GateDecision::Block(BlockReason::ConfidenceBelowMin)
        );
    }
}

//! Composite signal engine: blends four strategy lenses into a single
//! (score, confidence) pair, weighted per regime and asset group by the
//! active parameter snapshot.

use crate::application::strategies::traits::DetectionContext;
use crate::domain::errors::CandidateError;
use crate::domain::parameters::StrategyWeights;
use crate::domain::types::Side;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy)]
pub struct CompositeScore {
    /// Weighted blend in [0, 1].
    pub score: f64,
    /// Agreement measure in [0, 1]; high when the lenses commit the same way.
    pub confidence: f64,
    /// Raw-score adjustment in [-2.5, +2.5].
    pub bonus: f64,
    pub components: CompositeComponents,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeComponents {
    pub trend: Option<f64>,
    pub mean_reversion: Option<f64>,
    pub breakout: Option<f64>,
    pub volume: Option<f64>,
}

impl CompositeComponents {
    fn evaluated(&self) -> Vec<(f64, f64)> {
        // Pairs of (score, weight-slot); weight resolution happens later.
        [self.trend, self.mean_reversion, self.breakout, self.volume]
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|v| (v, i as f64)))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompositeEngine;

impl CompositeEngine {
    /// Scores the four lenses for the candidate side and blends them.
    /// Fails when fewer than three lenses can be evaluated.
    pub fn evaluate(
        &self,
        ctx: &DetectionContext<'_>,
        side: Side,
        weights: &StrategyWeights,
    ) -> Result<CompositeScore, CandidateError> {
        let components = CompositeComponents {
            trend: self.trend_score(ctx, side),
            mean_reversion: self.mean_reversion_score(ctx, side),
            breakout: self.breakout_score(ctx, side),
            volume: self.volume_score(ctx),
        };

        let evaluated = components.evaluated();
        if evaluated.len() < 3 {
            return Err(CandidateError::InsufficientSignals {
                evaluated: evaluated.len(),
            });
        }

        let weight_table = [
            weights.trend,
            weights.mean_reversion,
            weights.breakout,
            weights.volume,
        ];
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut scores = Vec::with_capacity(4);
        for (score, slot) in &evaluated {
            let w = weight_table[*slot as usize].max(0.0);
            weighted_sum += score * w;
            weight_total += w;
            scores.push(*score);
        }
        if weight_total == 0.0 {
            return Err(CandidateError::InsufficientSignals { evaluated: 0 });
        }

        let score = (weighted_sum / weight_total).clamp(0.0, 1.0);
        let confidence = agreement_confidence(&scores);
        let bonus = ((score - 0.5) * 5.0).clamp(-2.5, 2.5);

        Ok(CompositeScore {
            score,
            confidence,
            bonus,
            components,
        })
    }

    /// Trend lens: EMA stack alignment plus MACD sign, oriented to `side`.
    fn trend_score(&self, ctx: &DetectionContext<'_>, side: Side) -> Option<f64> {
        let ind = ctx.ind;
        let price = ctx.current_price.to_f64()?;
        if price <= 0.0 {
            return None;
        }
        let mut score: f64 = 0.5;
        let aligned_long = ind.ema_fast > ind.ema_slow && ind.ema_slow > ind.ema_trend;
        let aligned_short = ind.ema_fast < ind.ema_slow && ind.ema_slow < ind.ema_trend;
        match side {
            Side::Long => {
                if aligned_long {
                    score += 0.25;
                } else if aligned_short {
                    score -= 0.25;
                }
                if ind.macd.macd > 0.0 {
                    score += 0.15;
                }
                if price > ind.ema_trend {
                    score += 0.1;
                }
            }
            Side::Short => {
                if aligned_short {
                    score += 0.25;
                } else if aligned_long {
                    score -= 0.25;
                }
                if ind.macd.macd < 0.0 {
                    score += 0.15;
                }
                if price < ind.ema_trend {
                    score += 0.1;
                }
            }
        }
        Some(score.clamp(0.0, 1.0))
    }

    /// Mean-reversion lens: a stretch against the candidate side is
    /// favourable (buying below the mean, selling above it).
    fn mean_reversion_score(&self, ctx: &DetectionContext<'_>, side: Side) -> Option<f64> {
        let ind = ctx.ind;
        let price = ctx.current_price.to_f64()?;
        let width = ind.bollinger.upper - ind.bollinger.lower;
        if width <= 0.0 {
            return None;
        }
        // Position in the band: 0 at the lower band, 1 at the upper.
        let band_position = ((price - ind.bollinger.lower) / width).clamp(-0.5, 1.5);
        let score = match side {
            Side::Long => 1.0 - band_position,
            Side::Short => band_position,
        };
        Some(score.clamp(0.0, 1.0))
    }

    /// Breakout lens: where the close sits in the recent range, with any
    /// excursion beyond it counting fully toward the side that broke.
    fn breakout_score(&self, ctx: &DetectionContext<'_>, side: Side) -> Option<f64> {
        const LOOKBACK: usize = 20;
        if ctx.candles.len() < LOOKBACK + 1 {
            return None;
        }
        let window = &ctx.candles[ctx.candles.len() - LOOKBACK - 1..ctx.candles.len() - 1];
        let high = window.iter().filter_map(|c| c.high.to_f64()).fold(f64::MIN, f64::max);
        let low = window.iter().filter_map(|c| c.low.to_f64()).fold(f64::MAX, f64::min);
        let close = ctx.current_price.to_f64()?;
        if high <= low {
            return None;
        }
        let position = ((close - low) / (high - low)).clamp(0.0, 1.2);
        let score = match side {
            Side::Long => position / 1.2,
            Side::Short => (1.2 - position) / 1.2,
        };
        Some(score.clamp(0.0, 1.0))
    }

    /// Volume lens: participation vs the rolling mean, side-agnostic.
    fn volume_score(&self, ctx: &DetectionContext<'_>) -> Option<f64> {
        let stats = &ctx.ind.volume;
        if stats.mean <= 0.0 {
            return None;
        }
        let ratio = stats.last / stats.mean;
        // 1.0x mean maps to 0.5; 2x and above saturate at 1.0.
        Some(((ratio - 1.0) * 0.5 + 0.5).clamp(0.0, 1.0))
    }
}

/// Agreement via mean binary entropy: lenses committed near 0 or 1 carry
/// little entropy (strong agreement on direction quality), lenses hovering
/// at 0.5 carry maximum entropy (no consensus).
fn agreement_confidence(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let max_entropy = 2.0f64.ln();
    let mean_entropy = scores
        .iter()
        .map(|&s| binary_entropy(s.clamp(0.0, 1.0)))
        .sum::<f64>()
        / scores.len() as f64;
    (1.0 - mean_entropy / max_entropy).clamp(0.0, 1.0)
}

fn binary_entropy(p: f64) -> f64 {
    let mut h = 0.0;
    if p > 0.0 {
        h -= p * p.ln();
    }
    if p < 1.0 {
        h -= (1.0 - p) * (1.0 - p).ln();
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::testkit::{context, ramp_candles, set_from};
    use crate::domain::errors::CandidateError;

    #[test]
    fn test_aligned_uptrend_scores_high_for_long() {
        let candles = ramp_candles(80, 100.0, 0.4);
        let ind = set_from(&candles);
        let ctx = context(&candles, &ind);
        let engine = CompositeEngine;
        let composite = engine
            .evaluate(&ctx, Side::Long, &StrategyWeights::default())
            .unwrap();
        assert!(composite.score > 0.5, "score was {}", composite.score);
        assert!(composite.bonus > 0.0);
    }

    #[test]
    fn test_bonus_clamped() {
        let scores = [1.0, 1.0, 1.0, 1.0];
        let confidence = agreement_confidence(&scores);
        assert!((confidence - 1.0).abs() < 1e-9);
        // A perfect score of 1.0 yields bonus (1.0 - 0.5) * 5 = 2.5, the cap.
        assert!(((1.0f64 - 0.5) * 5.0).clamp(-2.5, 2.5) == 2.5);
    }

    #[test]
    fn test_uncommitted_lenses_yield_low_confidence() {
        let scores = [0.5, 0.5, 0.5, 0.5];
        assert!(agreement_confidence(&scores) < 0.05);
    }

    #[test]
    fn test_committed_lenses_yield_high_confidence() {
        let scores = [0.95, 0.9, 0.92, 0.88];
        assert!(agreement_confidence(&scores) > 0.5);
    }

    #[test]
    fn test_insufficient_lenses_error() {
        let candles = ramp_candles(80, 100.0, 0.4);
        let mut ind = set_from(&candles);
        // Kill the volume and mean-reversion lenses.
        ind.volume.mean = 0.0;
        ind.bollinger.upper = ind.bollinger.lower;
        // Breakout still works, trend still works: only 2 of 4.
        let ctx = context(&candles, &ind);
        let engine = CompositeEngine;
        let err = engine
            .evaluate(&ctx, Side::Long, &StrategyWeights::default())
            .unwrap_err();
        assert!(matches!(err, CandidateError::InsufficientSignals { evaluated: 2 }));
    }

    #[test]
    fn test_short_side_mirrors_trend_lens() {
        let candles = ramp_candles(80, 100.0, 0.4);
        let ind = set_from(&candles);
        let ctx = context(&candles, &ind);
        let engine = CompositeEngine;
        let long = engine
            .evaluate(&ctx, Side::Long, &StrategyWeights::default())
            .unwrap();
        let short = engine
            .evaluate(&ctx, Side::Short, &StrategyWeights::default())
            .unwrap();
        assert!(long.components.trend.unwrap() > short.components.trend.unwrap());
    }
}

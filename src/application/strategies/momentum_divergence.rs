use crate::application::strategies::traits::{DetectionContext, PatternDetector, PatternSignal};
use crate::domain::types::{PatternType, Side};
use rust_decimal::prelude::ToPrimitive;

/// Divergence between price extremes and MACD momentum: price printing a
/// fresh low while the histogram is already recovering reads long, and
/// mirrored for shorts.
#[derive(Debug, Clone)]
pub struct MomentumDivergenceDetector {
    /// Bars scanned for the price extreme.
    pub lookback: usize,
}

impl Default for MomentumDivergenceDetector {
    fn default() -> Self {
        Self { lookback: 12 }
    }
}

impl PatternDetector for MomentumDivergenceDetector {
    fn name(&self) -> &'static str {
        "momentum_divergence"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal> {
        if ctx.candles.len() < self.lookback + 1 {
            return None;
        }
        let ind = ctx.ind;
        let window = &ctx.candles[ctx.candles.len() - self.lookback..];
        let last_close = window.last()?.close.to_f64()?;
        let min_close = window
            .iter()
            .filter_map(|c| c.close.to_f64())
            .fold(f64::MAX, f64::min);
        let max_close = window
            .iter()
            .filter_map(|c| c.close.to_f64())
            .fold(f64::MIN, f64::max);

        let near_low = last_close <= min_close * 1.002;
        let near_high = last_close >= max_close * 0.998;
        let histogram_recovering = ind.macd.histogram > 0.0 && ind.macd.macd < 0.0;
        let histogram_fading = ind.macd.histogram < 0.0 && ind.macd.macd > 0.0;

        let side = if near_low && histogram_recovering {
            Side::Long
        } else if near_high && histogram_fading {
            Side::Short
        } else {
            return None;
        };

        let histogram_strength = if last_close > 0.0 {
            (ind.macd.histogram.abs() / last_close * 10_000.0).min(10.0)
        } else {
            0.0
        };
        let raw_score = 22.0 + histogram_strength * 2.0;
        let confidence = (0.4 + histogram_strength * 0.05).min(0.9);

        Some(PatternSignal {
            side,
            entry: ctx.current_price,
            pattern: PatternType::MomentumDivergence,
            raw_score,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::testkit::{context, ramp_candles, set_from};

    #[test]
    fn test_bullish_divergence_at_low() {
        let candles = ramp_candles(80, 120.0, -0.2);
        let mut ind = set_from(&candles);
        ind.macd.macd = -0.8;
        ind.macd.histogram = 0.15;
        let ctx = context(&candles, &ind);
        let signal = MomentumDivergenceDetector::default()
            .detect(&ctx)
            .expect("divergence long");
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.pattern, PatternType::MomentumDivergence);
    }

    #[test]
    fn test_bearish_divergence_at_high() {
        let candles = ramp_candles(80, 100.0, 0.2);
        let mut ind = set_from(&candles);
        ind.macd.macd = 0.9;
        ind.macd.histogram = -0.2;
        let ctx = context(&candles, &ind);
        let signal = MomentumDivergenceDetector::default()
            .detect(&ctx)
            .expect("divergence short");
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_no_divergence_mid_range() {
        // Rising series ends at its high, but histogram still positive.
        let candles = ramp_candles(80, 100.0, 0.2);
        let mut ind = set_from(&candles);
        ind.macd.macd = 0.9;
        ind.macd.histogram = 0.3;
        let ctx = context(&candles, &ind);
        assert!(MomentumDivergenceDetector::default().detect(&ctx).is_none());
    }
}

use crate::application::strategies::traits::{DetectionContext, PatternDetector, PatternSignal};
use crate::domain::types::{PatternType, Side};
use rust_decimal::prelude::ToPrimitive;

/// Range breakout with volume confirmation: the newest close clearing the
/// prior N-bar extreme on volume above the rolling mean.
#[derive(Debug, Clone)]
pub struct BreakoutDetector {
    pub lookback: usize,
    /// Volume must exceed the rolling mean by this factor.
    pub volume_factor: f64,
}

impl Default for BreakoutDetector {
    fn default() -> Self {
        Self {
            lookback: 20,
            volume_factor: 1.5,
        }
    }
}

impl PatternDetector for BreakoutDetector {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal> {
        if ctx.candles.len() < self.lookback + 1 {
            return None;
        }
        let (last, prior) = ctx.candles.split_last()?;
        let window = &prior[prior.len() - self.lookback..];

        let range_high = window.iter().filter_map(|c| c.high.to_f64()).fold(f64::MIN, f64::max);
        let range_low = window.iter().filter_map(|c| c.low.to_f64()).fold(f64::MAX, f64::min);
        let close = last.close.to_f64()?;

        let ind = ctx.ind;
        if ind.volume.mean <= 0.0 || ind.volume.last < ind.volume.mean * self.volume_factor {
            return None;
        }

        let (side, extent_pct) = if close > range_high {
            (Side::Long, (close - range_high) / range_high * 100.0)
        } else if close < range_low {
            (Side::Short, (range_low - close) / range_low * 100.0)
        } else {
            return None;
        };

        let volume_ratio = ind.volume.last / ind.volume.mean;
        let raw_score = 28.0 + (extent_pct * 30.0).min(15.0) + (volume_ratio - 1.0).min(3.0) * 4.0;
        let confidence =
            (0.5 + extent_pct.min(1.0) * 0.2 + (volume_ratio - 1.0).min(2.0) * 0.1).min(0.95);

        Some(PatternSignal {
            side,
            entry: ctx.current_price,
            pattern: PatternType::Breakout,
            raw_score,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategies::testkit::{context, flat_then_break, set_from};

    #[test]
    fn test_upside_breakout_with_volume() {
        let candles = flat_then_break(80, 100.0, 104.0);
        let mut ind = set_from(&candles);
        ind.volume.mean = 1000.0;
        ind.volume.last = 2500.0;
        let ctx = context(&candles, &ind);
        let signal = BreakoutDetector::default().detect(&ctx).expect("breakout");
        assert_eq!(signal.side, Side::Long);
        assert!(signal.raw_score > 28.0);
    }

    #[test]
    fn test_breakout_without_volume_suppressed() {
        let candles = flat_then_break(80, 100.0, 104.0);
        let mut ind = set_from(&candles);
        ind.volume.mean = 1000.0;
        ind.volume.last = 1100.0;
        let ctx = context(&candles, &ind);
        assert!(BreakoutDetector::default().detect(&ctx).is_none());
    }

    #[test]
    fn test_downside_breakout() {
        let candles = flat_then_break(80, 100.0, 96.0);
        let mut ind = set_from(&candles);
        ind.volume.mean = 1000.0;
        ind.volume.last = 2200.0;
        let ctx = context(&candles, &ind);
        let signal = BreakoutDetector::default().detect(&ctx).expect("breakdown");
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_inside_range_no_signal() {
        let candles = flat_then_break(80, 100.0, 100.1);
        let mut ind = set_from(&candles);
        ind.volume.mean = 1000.0;
        ind.volume.last = 3000.0;
        let ctx = context(&candles, &ind);
        assert!(BreakoutDetector::default().detect(&ctx).is_none());
    }
}

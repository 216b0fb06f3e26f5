use crate::application::strategies::traits::{DetectionContext, PatternDetector, PatternSignal};
use crate::domain::types::{PatternType, Side};

/// RSI exhaustion turning back: oversold and curling up reads long,
/// overbought and rolling over reads short. The turn (previous bar vs
/// current) is required so a falling knife never qualifies.
#[derive(Debug, Clone)]
pub struct RsiExtremeDetector {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiExtremeDetector {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl PatternDetector for RsiExtremeDetector {
    fn name(&self) -> &'static str {
        "rsi_extreme"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal> {
        let ind = ctx.ind;
        let turned_up = ind.rsi_prev < self.oversold && ind.rsi > ind.rsi_prev;
        let turned_down = ind.rsi_prev > self.overbought && ind.rsi < ind.rsi_prev;

        let (side, depth) = if turned_up {
            (Side::Long, (self.oversold - ind.rsi_prev).max(0.0))
        } else if turned_down {
            (Side::Short, (ind.rsi_prev - self.overbought).max(0.0))
        } else {
            return None;
        };

        // Depth of the extreme drives the score: RSI 15 is a stronger
        // reversal setup than RSI 29.
        let raw_score = 20.0 + depth.min(20.0) * 1.2;
        let confidence = (0.4 + depth / 40.0).min(0.85);

        Some(PatternSignal {
            side,
            entry: ctx.current_price,
            pattern: PatternType::RsiExtreme,
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
    fn test_oversold_turn_long() {
        let candles = ramp_candles(80, 100.0, -0.2);
        let mut ind = set_from(&candles);
        ind.rsi_prev = 22.0;
        ind.rsi = 27.0;
        let ctx = context(&candles, &ind);
        let signal = RsiExtremeDetector::default().detect(&ctx).expect("long");
        assert_eq!(signal.side, Side::Long);
        assert!(signal.raw_score > 20.0);
    }

    #[test]
    fn test_overbought_turn_short() {
        let candles = ramp_candles(80, 100.0, 0.2);
        let mut ind = set_from(&candles);
        ind.rsi_prev = 81.0;
        ind.rsi = 74.0;
        let ctx = context(&candles, &ind);
        let signal = RsiExtremeDetector::default().detect(&ctx).expect("short");
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_oversold_still_falling_no_signal() {
        let candles = ramp_candles(80, 100.0, -0.2);
        let mut ind = set_from(&candles);
        ind.rsi_prev = 25.0;
        ind.rsi = 21.0;
        let ctx = context(&candles, &ind);
        assert!(RsiExtremeDetector::default().detect(&ctx).is_none());
    }

    #[test]
    fn test_neutral_rsi_no_signal() {
        let candles = ramp_candles(80, 100.0, 0.0);
        let mut ind = set_from(&candles);
        ind.rsi_prev = 48.0;
        ind.rsi = 52.0;
        let ctx = context(&candles, &ind);
        assert!(RsiExtremeDetector::default().detect(&ctx).is_none());
    }

    #[test]
    fn test_deeper_extreme_scores_higher() {
        let candles = ramp_candles(80, 100.0, -0.2);
        let detector = RsiExtremeDetector::default();

        let mut shallow = set_from(&candles);
        shallow.rsi_prev = 28.0;
        shallow.rsi = 31.0;
        let shallow_score = detector
            .detect(&context(&candles, &shallow))
            .expect("shallow")
            .raw_score;

        let mut deep = set_from(&candles);
        deep.rsi_prev = 14.0;
        deep.rsi = 18.0;
        let deep_score = detector
            .detect(&context(&candles, &deep))
            .expect("deep")
            .raw_score;

        assert!(deep_score > shallow_score);
    }
}

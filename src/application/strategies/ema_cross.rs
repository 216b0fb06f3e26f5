use crate::application::strategies::traits::{DetectionContext, PatternDetector, PatternSignal};
use crate::domain::types::{PatternType, Side};

/// Classic EMA crossover: the fast EMA crossing the slow EMA on the
/// newest bar, with RSI confirming there is still room to run.
#[derive(Debug, Clone)]
pub struct EmaCrossDetector {
    /// RSI above this kills a long candidate (already overbought).
    pub rsi_overbought: f64,
    /// RSI below this kills a short candidate.
    pub rsi_oversold: f64,
}

impl Default for EmaCrossDetector {
    fn default() -> Self {
        Self {
            rsi_overbought: 75.0,
            rsi_oversold: 25.0,
        }
    }
}

impl PatternDetector for EmaCrossDetector {
    fn name(&self) -> &'static str {
        "ema_cross"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal> {
        let ind = ctx.ind;
        let crossed_up = ind.ema_fast_prev <= ind.ema_slow_prev && ind.ema_fast > ind.ema_slow;
        let crossed_down = ind.ema_fast_prev >= ind.ema_slow_prev && ind.ema_fast < ind.ema_slow;

        let side = if crossed_up {
            Side::Long
        } else if crossed_down {
            Side::Short
        } else {
            return None;
        };

        match side {
            Side::Long if ind.rsi >= self.rsi_overbought => return None,
            Side::Short if ind.rsi <= self.rsi_oversold => return None,
            _ => {}
        }

        // Cross separation in percent of price, the main strength input.
        let separation_pct = if ind.ema_slow != 0.0 {
            ((ind.ema_fast - ind.ema_slow) / ind.ema_slow * 100.0).abs()
        } else {
            0.0
        };
        // RSI headroom toward the exhaustion bound.
        let headroom = match side {
            Side::Long => (self.rsi_overbought - ind.rsi) / self.rsi_overbought,
            Side::Short => (ind.rsi - self.rsi_oversold) / (100.0 - self.rsi_oversold),
        }
        .clamp(0.0, 1.0);

        let raw_score = 25.0 + (separation_pct * 40.0).min(20.0) + headroom * 15.0;
        let confidence = (0.45 + separation_pct.min(1.0) * 0.3 + headroom * 0.2).min(0.95);

        Some(PatternSignal {
            side,
            entry: ctx.current_price,
            pattern: PatternType::EmaCross,
            raw_score,
            confidence,
        })
    }
}

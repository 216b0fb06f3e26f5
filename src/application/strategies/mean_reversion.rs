use crate::application::strategies::traits::{DetectionContext, PatternDetector, PatternSignal};
use crate::domain::types::{PatternType, Side};
use rust_decimal::prelude::*;
use statrs::statistics::{Data, Distribution};

/// Z-score mean reversion: fade a close stretched beyond `entry_threshold`
/// standard deviations from the rolling mean. Statistically rigorous and
/// adaptive to volatility, unlike fixed-band approaches.
#[derive(Debug, Clone)]
pub struct MeanReversionDetector {
    pub lookback: usize,
    /// Standard deviations from the mean that qualify as stretched.
    pub entry_threshold: f64,
}

impl Default for MeanReversionDetector {
    fn default() -> Self {
        Self {
            lookback: 20,
            entry_threshold: 2.0,
        }
    }
}

impl MeanReversionDetector {
    fn zscore(&self, ctx: &DetectionContext<'_>) -> Option<f64> {
        if ctx.candles.len() < self.lookback {
            return None;
        }
        let prices: Vec<f64> = ctx
            .candles
            .iter()
            .rev()
            .take(self.lookback)
            .filter_map(|c| c.close.to_f64())
            .collect();
        if prices.len() < self.lookback {
            return None;
        }
        let current = ctx.current_price.to_f64()?;
        let data = Data::new(prices);
        let mean = data.mean()?;
        let std_dev = data.std_dev()?;
        if std_dev == 0.0 {
            return None;
        }
        Some((current - mean) / std_dev)
    }
}

impl PatternDetector for MeanReversionDetector {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Option<PatternSignal> {
        let z = self.zscore(ctx)?;
        let side = if z <= -self.entry_threshold {
            Side::Long
        } else if z >= self.entry_threshold {
            Side::Short
        } else {
            return None;
        };

        let excess = (z.abs() - self.entry_threshold).max(0.0);
        let raw_score = 24.0 + (excess * 12.0).min(18.0);
        let confidence = (0.45 + excess * 0.15).min(0.9);

        Some(PatternSignal {
            side,
            entry: ctx.current_price,
            pattern: PatternType::MeanReversion,
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
    fn test_stretched_below_mean_fades_long() {
        let candles = flat_then_break(80, 100.0, 95.0);
        let ind = set_from(&candles);
        let ctx = context(&candles, &ind);
        let signal = MeanReversionDetector::default().detect(&ctx).expect("long fade");
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.pattern, PatternType::MeanReversion);
    }

    #[test]
    fn test_stretched_above_mean_fades_short() {
        let candles = flat_then_break(80, 100.0, 105.0);
        let ind = set_from(&candles);
        let ctx = context(&candles, &ind);
        let signal = MeanReversionDetector::default().detect(&ctx).expect("short fade");
        assert_eq!(signal.side, Side::Short);
    }

    #[test]
    fn test_near_mean_no_signal() {
        let candles = flat_then_break(80, 100.0, 100.05);
        let ind = set_from(&candles);
        let ctx = context(&candles, &ind);
        assert!(MeanReversionDetector::default().detect(&ctx).is_none());
    }

    #[test]
    fn test_deeper_stretch_scores_higher() {
        let detector = MeanReversionDetector::default();
        let mild = flat_then_break(80, 100.0, 96.5);
        let wild = flat_then_break(80, 100.0, 92.0);

        let mild_ind = set_from(&mild);
        let wild_ind = set_from(&wild);
        let mild_score = detector
            .detect(&context(&mild, &mild_ind))
            .map(|s| s.raw_score)
            .unwrap_or(0.0);
        let wild_score = detector
            .detect(&context(&wild, &wild_ind))
            .expect("wild stretch")
            .raw_score;
        assert!(wild_score >= mild_score);
    }
}

//! Market regime detection from BTC price action.
//!
//! Classifies the market into one of five regimes from the EMA(50) trend
//! slope, realized 24h volatility, and drawdown from the recent high.
//! The result is cached per BTC candle so a whole tick reads one snapshot.

use crate::application::market_data::indicators::{self, ema_series};
use crate::domain::errors::DataError;
use crate::domain::regime::{MarketRegime, RegimeSnapshot};
use crate::domain::types::Candle;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RegimeThresholds {
    /// Drawdown from the 24h high that flags a crash, percent.
    pub crash_drawdown_pct: f64,
    /// EMA(50) slope magnitude below which the market counts as ranging,
    /// percent per bar.
    pub slope_eps_pct: f64,
    /// Realized 24h volatility separating quiet from noisy ranges, percent.
    pub low_vol_threshold_pct: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            crash_drawdown_pct: 15.0,
            slope_eps_pct: 0.05,
            low_vol_threshold_pct: 0.8,
        }
    }
}

/// Bars of 1h history required: EMA(50) warm-up plus a slope window.
const MIN_HOURLY_BARS: usize = 60;
const SLOPE_WINDOW: usize = 6;
const DAY_BARS: usize = 24;

pub struct RegimeDetector {
    thresholds: RegimeThresholds,
    cache: Mutex<Option<RegimeSnapshot>>,
}

impl RegimeDetector {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self {
            thresholds,
            cache: Mutex::new(None),
        }
    }

    /// Classifies from BTC hourly candles (newest last). The 4h series
    /// refines trend confidence when available.
    pub fn detect(
        &self,
        btc_1h: &[Candle],
        btc_4h: &[Candle],
    ) -> Result<RegimeSnapshot, DataError> {
        if btc_1h.len() < MIN_HOURLY_BARS {
            return Err(DataError::InsufficientData {
                required: MIN_HOURLY_BARS,
                got: btc_1h.len(),
            });
        }
        let as_of = btc_1h.last().expect("length checked").timestamp;

        {
            let cache = self.cache.lock().expect("regime cache poisoned");
            if let Some(snapshot) = *cache
                && snapshot.as_of == as_of
            {
                return Ok(snapshot);
            }
        }

        let snapshot = self.classify(btc_1h, btc_4h, as_of)?;
        *self.cache.lock().expect("regime cache poisoned") = Some(snapshot);
        Ok(snapshot)
    }

    fn classify(
        &self,
        btc_1h: &[Candle],
        btc_4h: &[Candle],
        as_of: i64,
    ) -> Result<RegimeSnapshot, DataError> {
        let closes = indicators::closes(btc_1h);
        let price = *closes.last().expect("length checked");

        // EMA(50) slope over the trailing window, percent per bar.
        let ema50 = ema_series(&closes, 50)?;
        let slope_pct = if ema50.len() > SLOPE_WINDOW && price > 0.0 {
            let older = ema50[ema50.len() - 1 - SLOPE_WINDOW];
            let newest = ema50[ema50.len() - 1];
            (newest - older) / older / SLOPE_WINDOW as f64 * 100.0
        } else {
            0.0
        };

        let vol_pct = indicators::realized_volatility_pct(&closes, DAY_BARS)?;

        // Drawdown from the 24h high.
        let high_24h = btc_1h[btc_1h.len() - DAY_BARS.min(btc_1h.len())..]
            .iter()
            .filter_map(|c| c.high.to_f64())
            .fold(f64::MIN, f64::max);
        let drawdown_pct = if high_24h > 0.0 {
            (high_24h - price) / high_24h * 100.0
        } else {
            0.0
        };

        let t = &self.thresholds;
        let (regime, confidence) = if drawdown_pct > t.crash_drawdown_pct {
            let margin = (drawdown_pct - t.crash_drawdown_pct) / t.crash_drawdown_pct;
            (MarketRegime::Crash, 0.6 + margin.min(1.0) * 0.4)
        } else if slope_pct.abs() < t.slope_eps_pct {
            let flatness = 1.0 - slope_pct.abs() / t.slope_eps_pct;
            if vol_pct < t.low_vol_threshold_pct {
                (MarketRegime::LowVolRange, 0.5 + flatness * 0.4)
            } else {
                let vol_excess =
                    ((vol_pct - t.low_vol_threshold_pct) / t.low_vol_threshold_pct).min(1.0);
                (MarketRegime::HighVolRange, 0.5 + (flatness * 0.25 + vol_excess * 0.2))
            }
        } else {
            let strength = ((slope_pct.abs() - t.slope_eps_pct) / (t.slope_eps_pct * 4.0))
                .min(1.0);
            let mut confidence = 0.5 + strength * 0.45;
            // Agreeing 4h trend firms the call; a contradicting one softens it.
            if let Some(htf_slope) = htf_slope_pct(btc_4h) {
                if htf_slope.signum() == slope_pct.signum() {
                    confidence = (confidence + 0.05).min(1.0);
                } else {
                    confidence = (confidence - 0.1).max(0.3);
                }
            }
            if slope_pct > 0.0 {
                (MarketRegime::BullTrend, confidence)
            } else {
                (MarketRegime::BearTrend, confidence)
            }
        };

        debug!(
            "Regime {} (conf {:.2}): slope={:.4}%/bar vol={:.2}% dd={:.2}%",
            regime, confidence, slope_pct, vol_pct, drawdown_pct
        );

        Ok(RegimeSnapshot::new(regime, confidence, as_of))
    }
}

fn htf_slope_pct(btc_4h: &[Candle]) -> Option<f64> {
    if btc_4h.len() < 55 {
        return None;
    }
    let closes = indicators::closes(btc_4h);
    let ema50 = ema_series(&closes, 50).ok()?;
    let newest = *ema50.last()?;
    let older = ema50[ema50.len() - 4];
    if older == 0.0 {
        return None;
    }
    Some((newest - older) / older * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candle(t: i64, price: f64) -> Candle {
        let p = Decimal::from_f64_retain(price).unwrap();
        Candle {
            symbol: "BTCUSDT".to_string(),
            timestamp: t,
            open: p,
            high: p * dec!(1.002),
            low: p * dec!(0.998),
            close: p,
            volume: dec!(500),
        }
    }

    fn series(f: impl Fn(usize) -> f64, n: usize) -> Vec<Candle> {
        (0..n).map(|i| candle(i as i64 * 3600, f(i))).collect()
    }

    #[test]
    fn test_bull_trend_detected() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        let candles = series(|i| 50_000.0 * 1.002f64.powi(i as i32), 120);
        let snap = detector.detect(&candles, &[]).unwrap();
        assert_eq!(snap.regime, MarketRegime::BullTrend);
        assert!(snap.confidence > 0.5);
        assert_eq!(snap.multipliers.size, 1.4);
    }

    #[test]
    fn test_bear_trend_detected() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        let candles = series(|i| 50_000.0 * 0.998f64.powi(i as i32), 120);
        let snap = detector.detect(&candles, &[]).unwrap();
        assert_eq!(snap.regime, MarketRegime::BearTrend);
    }

    #[test]
    fn test_quiet_range_detected() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        let candles = series(|i| 50_000.0 + (i % 2) as f64 * 10.0, 120);
        let snap = detector.detect(&candles, &[]).unwrap();
        assert_eq!(snap.regime, MarketRegime::LowVolRange);
    }

    #[test]
    fn test_noisy_range_detected() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        // Flat on average, but swinging hard bar to bar.
        let candles = series(|i| 50_000.0 * if i % 2 == 0 { 1.0 } else { 1.03 }, 120);
        let snap = detector.detect(&candles, &[]).unwrap();
        assert_eq!(snap.regime, MarketRegime::HighVolRange);
    }

    #[test]
    fn test_crash_detected() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        // Stable, then a 20% dump in the last bars.
        let candles = series(
            |i| if i < 110 { 50_000.0 } else { 50_000.0 * (1.0 - 0.02 * (i - 109) as f64) },
            120,
        );
        let snap = detector.detect(&candles, &[]).unwrap();
        assert_eq!(snap.regime, MarketRegime::Crash);
        assert!(snap.confidence >= 0.6);
        assert_eq!(snap.multipliers.threshold, 1.5);
    }

    #[test]
    fn test_cache_hit_on_same_candle() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        let candles = series(|i| 50_000.0 * 1.002f64.powi(i as i32), 120);
        let first = detector.detect(&candles, &[]).unwrap();
        let second = detector.detect(&candles, &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_of, candles.last().unwrap().timestamp);
    }

    #[test]
    fn test_insufficient_history() {
        let detector = RegimeDetector::new(RegimeThresholds::default());
        let candles = series(|_| 50_000.0, 10);
        assert!(detector.detect(&candles, &[]).is_err());
    }
}

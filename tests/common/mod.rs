//! Shared fixtures for the scenario tests.
#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use signalforge::config::{
    Config, CorrelationConfig, LifecycleConfig, NotificationConfig, SchedulerConfig,
    ScoringConfig, SizingConfig, UniverseConfig,
};
use signalforge::domain::regime::MarketRegime;
use signalforge::domain::types::{Candle, Interval, PatternType, Side, SignalCandidate};

pub fn candle(symbol: &str, t: i64, close: f64, volume: f64) -> Candle {
    let price = Decimal::from_f64(close).unwrap();
    Candle {
        symbol: symbol.to_string(),
        timestamp: t,
        open: price,
        high: price * dec!(1.002),
        low: price * dec!(0.998),
        close: price,
        volume: Decimal::from_f64(volume).unwrap(),
    }
}

/// Flat series with the last bar stepped up to `last_close`, ending at
/// `now`. Engineered to fire the EMA-cross detector on the final bar.
pub fn flat_then_jump(
    symbol: &str,
    n: usize,
    base: f64,
    last_close: f64,
    interval: Interval,
    now: i64,
) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let t = now - (n as i64 - 1 - i as i64) * interval.secs();
            let close = if i == n - 1 { last_close } else { base };
            candle(symbol, t, close, 2000.0)
        })
        .collect()
}

/// Correlated pair: both symbols follow the same deterministic return
/// sequence, one leveraged 1.1x, so their log-returns correlate ~1.
pub fn correlated_pair(
    a: &str,
    b: &str,
    n: usize,
    interval: Interval,
    now: i64,
) -> (Vec<Candle>, Vec<Candle>) {
    let mut price_a = 50_000.0;
    let mut price_b = 2_500.0;
    let mut series_a = Vec::with_capacity(n);
    let mut series_b = Vec::with_capacity(n);
    for i in 0..n {
        let step = if (i * 7 + 3) % 5 < 2 { 0.01 } else { -0.008 };
        price_a *= 1.0 + step;
        price_b *= 1.0 + step * 1.1;
        let t = now - (n as i64 - 1 - i as i64) * interval.secs();
        series_a.push(candle(a, t, price_a, 2000.0));
        series_b.push(candle(b, t, price_b, 2000.0));
    }
    (series_a, series_b)
}

/// A config with wide-open data gates: the scenario under test controls
/// which gate decides, not incidental market texture.
pub fn lenient_config(symbols: Vec<&str>) -> Config {
    Config {
        universe: UniverseConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            interval: Interval::H1,
            htf_interval: Interval::H4,
            candle_capacity: 500,
            fetch_limit: 200,
            prefer_highest_score: false,
        },
        scoring: ScoringConfig {
            threshold_soft: 5.0,
            threshold_strict: 25.0,
            quality_min: 0.0,
            min_composite_confidence: 0.0,
            volume_min_usd: 0.0,
            volume_max_usd: f64::MAX,
            volume_vs_mean_min: 0.0,
            volatility_min_pct: 0.0,
            volatility_max_pct: 1000.0,
            anomaly_zscore_max: 1e9,
            anomaly_wick_atr_max: 1e9,
        },
        sizing: SizingConfig::default(),
        lifecycle: LifecycleConfig::default(),
        // The duplicate gate owns repeat suppression in these scenarios;
        // a zero cooldown keeps the correlation gate out of the way.
        correlation: CorrelationConfig {
            cooldown_min: 0,
            ..CorrelationConfig::default()
        },
        scheduler: SchedulerConfig::default(),
        notification: NotificationConfig::default(),
        database_url: String::new(),
        observability_enabled: false,
        observability_interval_secs: 60,
        subscribed_users: vec![1],
    }
}

pub fn candidate(symbol: &str, side: Side, regime: MarketRegime) -> SignalCandidate {
    SignalCandidate {
        symbol: symbol.to_string(),
        side,
        entry: dec!(2500),
        pattern: PatternType::EmaCross,
        raw_score: 40.0,
        regime_at_gen: regime,
        composite_score: 0.82,
        composite_confidence: 0.85,
        quality_score: 0.75,
        pattern_confidence: 0.7,
        atr: dec!(12),
        volatility_pct: 2.0,
        candle_t: 1_700_000_000,
    }
}

//! Pure indicator kernel. Deterministic functions over candle slices;
//! same input, same output. Anything shorter than an indicator's warm-up
//! returns `DataError::InsufficientData`.
//!
//! Price series cross into f64 at this boundary; ATR stays `Decimal`
//! because it feeds straight back into level arithmetic.

use crate::domain::errors::DataError;
use crate::domain::types::{Candle, Interval};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use statrs::statistics::{Data, Distribution};
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};
use ta::{DataItem, Next};

pub const EMA_FAST_PERIOD: usize = 9;
pub const EMA_SLOW_PERIOD: usize = 21;
pub const EMA_TREND_PERIOD: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const BB_PERIOD: usize = 20;
pub const BB_STD_DEV: f64 = 2.0;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeStats {
    pub mean: f64,
    pub std_dev: f64,
    pub last: f64,
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().filter_map(|c| c.close.to_f64()).collect()
}

/// Last value of an n-period EMA over the closes.
pub fn ema(closes: &[f64], period: usize) -> Result<f64, DataError> {
    if closes.len() < period {
        return Err(DataError::InsufficientData {
            required: period,
            got: closes.len(),
        });
    }
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|_| DataError::InsufficientData { required: period, got: 0 })?;
    let mut value = 0.0;
    for &close in closes {
        value = indicator.next(close);
    }
    Ok(value)
}

/// Full EMA series (one value per input close after warm-up seeding).
pub fn ema_series(closes: &[f64], period: usize) -> Result<Vec<f64>, DataError> {
    if closes.len() < period {
        return Err(DataError::InsufficientData {
            required: period,
            got: closes.len(),
        });
    }
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|_| DataError::InsufficientData { required: period, got: 0 })?;
    Ok(closes.iter().map(|&c| indicator.next(c)).collect())
}

pub fn rsi(closes: &[f64], period: usize) -> Result<f64, DataError> {
    if closes.len() < period + 1 {
        return Err(DataError::InsufficientData {
            required: period + 1,
            got: closes.len(),
        });
    }
    let mut indicator = RelativeStrengthIndex::new(period)
        .map_err(|_| DataError::InsufficientData { required: period, got: 0 })?;
    let mut value = 50.0;
    for &close in closes {
        value = indicator.next(close);
    }
    Ok(value)
}

pub fn macd(closes: &[f64]) -> Result<MacdValue, DataError> {
    let required = MACD_SLOW + MACD_SIGNAL;
    if closes.len() < required {
        return Err(DataError::InsufficientData {
            required,
            got: closes.len(),
        });
    }
    let mut indicator =
        MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
            .map_err(|_| DataError::InsufficientData { required, got: 0 })?;
    let mut out = indicator.next(closes[0]);
    for &close in &closes[1..] {
        out = indicator.next(close);
    }
    Ok(MacdValue {
        macd: out.macd,
        signal: out.signal,
        histogram: out.histogram,
    })
}

/// ATR over full candles (true range needs high/low/previous close).
pub fn atr(candles: &[Candle], period: usize) -> Result<Decimal, DataError> {
    if candles.len() < period + 1 {
        return Err(DataError::InsufficientData {
            required: period + 1,
            got: candles.len(),
        });
    }
    let mut indicator = AverageTrueRange::new(period)
        .map_err(|_| DataError::InsufficientData { required: period, got: 0 })?;
    let mut value = 0.0;
    for candle in candles {
        let item = DataItem::builder()
            .open(candle.open.to_f64().unwrap_or(0.0))
            .high(candle.high.to_f64().unwrap_or(0.0))
            .low(candle.low.to_f64().unwrap_or(0.0))
            .close(candle.close.to_f64().unwrap_or(0.0))
            .volume(candle.volume.to_f64().unwrap_or(0.0))
            .build()
            .map_err(|_| DataError::NotANumber {
                symbol: candle.symbol.clone(),
            })?;
        value = indicator.next(&item);
    }
    Decimal::from_f64(value).ok_or(DataError::NotANumber {
        symbol: candles[0].symbol.clone(),
    })
}

pub fn bollinger(closes: &[f64]) -> Result<BollingerValue, DataError> {
    if closes.len() < BB_PERIOD {
        return Err(DataError::InsufficientData {
            required: BB_PERIOD,
            got: closes.len(),
        });
    }
    let mut indicator = BollingerBands::new(BB_PERIOD, BB_STD_DEV)
        .map_err(|_| DataError::InsufficientData { required: BB_PERIOD, got: 0 })?;
    let mut out = indicator.next(closes[0]);
    for &close in &closes[1..] {
        out = indicator.next(close);
    }
    Ok(BollingerValue {
        upper: out.upper,
        middle: out.average,
        lower: out.lower,
    })
}

/// Rolling mean/std of volume over the trailing `window` candles.
pub fn volume_stats(candles: &[Candle], window: usize) -> Result<VolumeStats, DataError> {
    if candles.len() < window {
        return Err(DataError::InsufficientData {
            required: window,
            got: candles.len(),
        });
    }
    let volumes: Vec<f64> = candles[candles.len() - window..]
        .iter()
        .filter_map(|c| c.volume.to_f64())
        .collect();
    if volumes.len() < window {
        return Err(DataError::NotANumber {
            symbol: candles[0].symbol.clone(),
        });
    }
    let last = *volumes.last().expect("window verified non-empty");
    let data = Data::new(volumes);
    let mean = data.mean().unwrap_or(0.0);
    let std_dev = data.std_dev().unwrap_or(0.0);
    Ok(VolumeStats { mean, std_dev, last })
}

pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Realized volatility: std of log-returns over `window` candles, percent.
pub fn realized_volatility_pct(closes: &[f64], window: usize) -> Result<f64, DataError> {
    if closes.len() < window + 1 {
        return Err(DataError::InsufficientData {
            required: window + 1,
            got: closes.len(),
        });
    }
    let returns = log_returns(&closes[closes.len() - window - 1..]);
    if returns.len() < 2 {
        return Err(DataError::InsufficientData {
            required: 2,
            got: returns.len(),
        });
    }
    let data = Data::new(returns);
    Ok(data.std_dev().unwrap_or(0.0) * 100.0)
}

/// Z-score of the newest close-to-close return against the window.
pub fn last_return_zscore(closes: &[f64], window: usize) -> Result<f64, DataError> {
    if closes.len() < window + 1 {
        return Err(DataError::InsufficientData {
            required: window + 1,
            got: closes.len(),
        });
    }
    let returns = log_returns(&closes[closes.len() - window - 1..]);
    let (last, rest) = match returns.split_last() {
        Some(split) => split,
        None => return Ok(0.0),
    };
    if rest.len() < 2 {
        return Ok(0.0);
    }
    let data = Data::new(rest.to_vec());
    let mean = data.mean().unwrap_or(0.0);
    let std_dev = data.std_dev().unwrap_or(0.0);
    if std_dev == 0.0 {
        return Ok(0.0);
    }
    Ok((last - mean) / std_dev)
}

/// Pearson correlation of two equally-long series.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 3 {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Everything the detectors and gates read for one symbol on one tick,
/// computed once from a single snapshot.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub price: Decimal,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub ema_trend: f64,
    /// Previous-bar values, for cross detection.
    pub ema_fast_prev: f64,
    pub ema_slow_prev: f64,
    pub rsi: f64,
    pub rsi_prev: f64,
    pub macd: MacdValue,
    pub atr: Decimal,
    pub bollinger: BollingerValue,
    pub volume: VolumeStats,
    /// Sum of close * volume over the trailing 24 hours.
    pub volume_usd_24h: f64,
    pub realized_vol_pct: f64,
    pub last_return_zscore: f64,
}

impl IndicatorSet {
    /// Minimum history required before a set can be computed.
    pub fn warmup() -> usize {
        (MACD_SLOW + MACD_SIGNAL).max(EMA_TREND_PERIOD) + 2
    }

    pub fn compute(candles: &[Candle], interval: Interval) -> Result<Self, DataError> {
        let required = Self::warmup();
        if candles.len() < required {
            return Err(DataError::InsufficientData {
                required,
                got: candles.len(),
            });
        }
        let closes_all = closes(candles);
        if closes_all.len() != candles.len() || closes_all.iter().any(|c| !c.is_finite()) {
            return Err(DataError::NotANumber {
                symbol: candles[0].symbol.clone(),
            });
        }
        let prev = &closes_all[..closes_all.len() - 1];

        let candles_per_day = (86_400 / interval.secs()).max(1) as usize;
        let vol_window = candles_per_day.min(candles.len());
        let volume_usd_24h = candles[candles.len() - vol_window..]
            .iter()
            .map(|c| {
                c.close.to_f64().unwrap_or(0.0) * c.volume.to_f64().unwrap_or(0.0)
            })
            .sum();

        Ok(Self {
            price: candles.last().expect("length checked").close,
            ema_fast: ema(&closes_all, EMA_FAST_PERIOD)?,
            ema_slow: ema(&closes_all, EMA_SLOW_PERIOD)?,
            ema_trend: ema(&closes_all, EMA_TREND_PERIOD)?,
            ema_fast_prev: ema(prev, EMA_FAST_PERIOD)?,
            ema_slow_prev: ema(prev, EMA_SLOW_PERIOD)?,
            rsi: rsi(&closes_all, RSI_PERIOD)?,
            rsi_prev: rsi(prev, RSI_PERIOD)?,
            macd: macd(&closes_all)?,
            atr: atr(candles, ATR_PERIOD)?,
            bollinger: bollinger(&closes_all)?,
            volume: volume_stats(candles, BB_PERIOD.min(candles.len()))?,
            volume_usd_24h,
            realized_vol_pct: realized_volatility_pct(
                &closes_all,
                vol_window.min(closes_all.len() - 1),
            )?,
            last_return_zscore: last_return_zscore(
                &closes_all,
                vol_window.min(closes_all.len() - 1),
            )?,
        })
    }
}

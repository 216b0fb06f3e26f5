use crate::config::parse_f64;
use anyhow::Result;

/// Score thresholds and the volume/volatility admission bands used by the
/// filter pipeline.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Raw-score floor before regime scaling.
    pub threshold_soft: f64,
    /// Raw-score floor for bypassing the BTC side filter in adverse regimes.
    pub threshold_strict: f64,
    pub quality_min: f64,
    pub min_composite_confidence: f64,
    /// 24h USD volume admission band.
    pub volume_min_usd: f64,
    pub volume_max_usd: f64,
    /// Recent volume must exceed rolling mean times this.
    pub volume_vs_mean_min: f64,
    /// Realized volatility admission band, percent.
    pub volatility_min_pct: f64,
    pub volatility_max_pct: f64,
    /// Z-score ceiling for the anomaly gate.
    pub anomaly_zscore_max: f64,
    /// Wick length ceiling as a multiple of ATR.
    pub anomaly_wick_atr_max: f64,
}

impl ScoringConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            threshold_soft: parse_f64("THRESHOLD_SOFT", 15.0)?,
            threshold_strict: parse_f64("THRESHOLD_STRICT", 25.0)?,
            quality_min: parse_f64("QUALITY_MIN", 0.55)?,
            min_composite_confidence: parse_f64("MIN_COMPOSITE_CONFIDENCE", 0.35)?,
            volume_min_usd: parse_f64("VOLUME_MIN_USD", 5_000_000.0)?,
            volume_max_usd: parse_f64("VOLUME_MAX_USD", 5_000_000_000.0)?,
            volume_vs_mean_min: parse_f64("VOLUME_VS_MEAN_MIN", 0.8)?,
            volatility_min_pct: parse_f64("VOLATILITY_MIN_PCT", 0.5)?,
            volatility_max_pct: parse_f64("VOLATILITY_MAX_PCT", 15.0)?,
            anomaly_zscore_max: parse_f64("ANOMALY_ZSCORE_MAX", 4.0)?,
            anomaly_wick_atr_max: parse_f64("ANOMALY_WICK_ATR_MAX", 5.0)?,
        })
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold_soft: 15.0,
            threshold_strict: 25.0,
            quality_min: 0.55,
            min_composite_confidence: 0.35,
            volume_min_usd: 5_000_000.0,
            volume_max_usd: 5_000_000_000.0,
            volume_vs_mean_min: 0.8,
            volatility_min_pct: 0.5,
            volatility_max_pct: 15.0,
            anomaly_zscore_max: 4.0,
            anomaly_wick_atr_max: 5.0,
        }
    }
}

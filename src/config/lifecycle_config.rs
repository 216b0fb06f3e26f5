use crate::config::{parse_f64, parse_u64};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

/// One coherent block for everything the lifecycle manager tunes:
/// stop/target placement, trailing behaviour and partial take-profit.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// ATR multiple for the initial stop.
    pub k_sl: f64,
    /// ATR multiples for the two targets.
    pub k_tp1: f64,
    pub k_tp2: f64,
    /// Unrealized profit (percent) required before trailing arms.
    pub activation_min_profit_pct: f64,
    /// ATR multiple for the trailing distance.
    pub k_trail: f64,
    /// Floor on the trailing distance, percent of price.
    pub min_trail_distance_pct: f64,
    /// Cap on the trailing distance, percent of price.
    pub max_trail_distance_pct: f64,
    /// Stop floor once trailing/TP1 engage: breakeven plus this offset.
    pub breakeven_offset_pct: f64,
    /// Fraction of the position closed at TP1, percent.
    pub tp1_split_pct: f64,
    /// Partial TP only runs when the remaining size is at least this.
    pub min_partial_size_usdt: Decimal,
    /// Lifecycle evaluation cadence.
    pub tick_secs: u64,
}

impl LifecycleConfig {
    pub fn from_env() -> Result<Self> {
        let min_partial = parse_f64("MIN_PARTIAL_SIZE_USDT", 50.0)?;
        Ok(Self {
            k_sl: parse_f64("K_SL", 1.5)?,
            k_tp1: parse_f64("K_TP1", 1.5)?,
            k_tp2: parse_f64("K_TP2", 3.0)?,
            activation_min_profit_pct: parse_f64("TRAIL_ACTIVATION_MIN_PROFIT_PCT", 1.0)?,
            k_trail: parse_f64("K_TRAIL", 1.0)?,
            min_trail_distance_pct: parse_f64("MIN_TRAIL_DISTANCE_PCT", 0.3)?,
            max_trail_distance_pct: parse_f64("MAX_TRAIL_DISTANCE_PCT", 3.0)?,
            breakeven_offset_pct: parse_f64("BREAKEVEN_OFFSET_PCT", 0.3)?,
            tp1_split_pct: parse_f64("TP1_SPLIT_PCT", 50.0)?,
            min_partial_size_usdt: Decimal::from_f64(min_partial)
                .ok_or_else(|| anyhow::anyhow!("MIN_PARTIAL_SIZE_USDT is not finite"))?,
            tick_secs: parse_u64("LIFECYCLE_TICK_SECS", 30)?,
        })
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            k_sl: 1.5,
            k_tp1: 1.5,
            k_tp2: 3.0,
            activation_min_profit_pct: 1.0,
            k_trail: 1.0,
            min_trail_distance_pct: 0.3,
            max_trail_distance_pct: 3.0,
            breakeven_offset_pct: 0.3,
            tp1_split_pct: 50.0,
            min_partial_size_usdt: dec!(50),
            tick_secs: 30,
        }
    }
}

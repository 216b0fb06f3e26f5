use crate::config::{parse_f64, parse_u64};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub base_usdt: Decimal,
    pub leverage: u32,
    /// Hard cap on a single position as a fraction of account equity.
    pub max_position_pct: f64,
}

impl SizingConfig {
    pub fn from_env() -> Result<Self> {
        let base = parse_f64("BASE_USDT", 100.0)?;
        Ok(Self {
            base_usdt: Decimal::from_f64(base)
                .ok_or_else(|| anyhow::anyhow!("BASE_USDT is not a finite number"))?,
            leverage: parse_u64("LEVERAGE", 10)? as u32,
            max_position_pct: parse_f64("MAX_POSITION_PCT", 0.10)?,
        })
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_usdt: dec!(100),
            leverage: 10,
            max_position_pct: 0.10,
        }
    }
}

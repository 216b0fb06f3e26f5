//! Adaptive position sizer: blends composite score, quality, regime and
//! volatility into a size multiplier in [0.5, 1.5], then applies the
//! regime size multiplier and any correlation penalty on top of the base
//! stake.

use crate::config::{ScoringConfig, SizingConfig};
use crate::domain::regime::RegimeSnapshot;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// The adaptive multiplier: 0.4 composite + 0.3 quality + 0.2 regime
    /// + 0.1 volatility, each factor pre-mapped into [0.5, 1.5].
    pub fn adaptive_multiplier(
        &self,
        composite_score: f64,
        quality_score: f64,
        regime: &RegimeSnapshot,
        volatility_pct: f64,
        scoring: &ScoringConfig,
    ) -> f64 {
        let composite_factor = 0.5 + composite_score.clamp(0.0, 1.0);
        let quality_factor = 0.5 + quality_score.clamp(0.0, 1.0);
        let regime_factor = regime.multipliers.size.clamp(0.5, 1.5);
        let vol_factor = volatility_factor(
            volatility_pct,
            scoring.volatility_min_pct,
            scoring.volatility_max_pct,
        );

        (0.4 * composite_factor + 0.3 * quality_factor + 0.2 * regime_factor + 0.1 * vol_factor)
            .clamp(0.5, 1.5)
    }

    /// Final stake: base, regime size multiplier, adaptive multiplier,
    /// correlation penalty.
    pub fn size_usdt(
        &self,
        regime: &RegimeSnapshot,
        adaptive_multiplier: f64,
        correlation_penalty: f64,
    ) -> Decimal {
        let combined =
            regime.multipliers.size * adaptive_multiplier * correlation_penalty.clamp(0.0, 1.0);
        self.config.base_usdt * Decimal::from_f64(combined).unwrap_or(Decimal::ONE)
    }

    pub fn leverage(&self) -> u32 {
        self.config.leverage
    }
}

/// Quiet tape sizes up, violent tape sizes down: linear from 1.5 at the
/// low volatility bound to 0.5 at the high bound.
fn volatility_factor(volatility_pct: f64, min_pct: f64, max_pct: f64) -> f64 {
    if max_pct <= min_pct {
        return 1.0;
    }
    let t = ((volatility_pct - min_pct) / (max_pct - min_pct)).clamp(0.0, 1.0);
    1.5 - t
}

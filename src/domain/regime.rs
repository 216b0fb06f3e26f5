use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse market state derived from BTC price action. Drives sizing,
/// stop/target widths and score thresholds for every symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    BullTrend,
    BearTrend,
    HighVolRange,
    LowVolRange,
    Crash,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 5] = [
        MarketRegime::BullTrend,
        MarketRegime::BearTrend,
        MarketRegime::HighVolRange,
        MarketRegime::LowVolRange,
        MarketRegime::Crash,
    ];

    /// The static multiplier table. Adaptive tuning layers on top of
    /// `threshold` via the parameter snapshot; the others are fixed.
    pub fn multipliers(&self) -> RegimeMultipliers {
        match self {
            MarketRegime::BullTrend => RegimeMultipliers {
                size: 1.4,
                sl: 0.8,
                tp: 1.5,
                threshold: 0.9,
            },
            MarketRegime::BearTrend => RegimeMultipliers {
                size: 0.6,
                sl: 1.3,
                tp: 0.9,
                threshold: 1.15,
            },
            MarketRegime::HighVolRange => RegimeMultipliers {
                size: 0.9,
                sl: 1.2,
                tp: 1.0,
                threshold: 1.0,
            },
            MarketRegime::LowVolRange => RegimeMultipliers {
                size: 1.0,
                sl: 1.0,
                tp: 1.0,
                threshold: 1.0,
            },
            MarketRegime::Crash => RegimeMultipliers {
                size: 0.2,
                sl: 1.5,
                tp: 0.7,
                threshold: 1.5,
            },
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::BullTrend => write!(f, "BULL_TREND"),
            MarketRegime::BearTrend => write!(f, "BEAR_TREND"),
            MarketRegime::HighVolRange => write!(f, "HIGH_VOL_RANGE"),
            MarketRegime::LowVolRange => write!(f, "LOW_VOL_RANGE"),
            MarketRegime::Crash => write!(f, "CRASH"),
        }
    }
}

impl FromStr for MarketRegime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BULL_TREND" => Ok(MarketRegime::BullTrend),
            "BEAR_TREND" => Ok(MarketRegime::BearTrend),
            "HIGH_VOL_RANGE" => Ok(MarketRegime::HighVolRange),
            "LOW_VOL_RANGE" => Ok(MarketRegime::LowVolRange),
            "CRASH" => Ok(MarketRegime::Crash),
            _ => anyhow::bail!("Unknown market regime: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeMultipliers {
    pub size: f64,
    pub sl: f64,
    pub tp: f64,
    pub threshold: f64,
}

/// Immutable regime classification, computed at most once per tick and
/// shared by value with every worker. `as_of` is the open time of the
/// newest BTC candle that produced it, which also keys the per-tick cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: MarketRegime,
    pub confidence: f64,
    pub multipliers: RegimeMultipliers,
    pub as_of: i64,
}

impl RegimeSnapshot {
    pub fn new(regime: MarketRegime, confidence: f64, as_of: i64) -> Self {
        Self {
            regime,
            confidence: confidence.clamp(0.0, 1.0),
            multipliers: regime.multipliers(),
            as_of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_table() {
        let bull = MarketRegime::BullTrend.multipliers();
        assert_eq!(bull.size, 1.4);
        assert_eq!(bull.sl, 0.8);
        assert_eq!(bull.tp, 1.5);
        assert_eq!(bull.threshold, 0.9);

        let crash = MarketRegime::Crash.multipliers();
        assert_eq!(crash.size, 0.2);
        assert_eq!(crash.threshold, 1.5);
    }

    #[test]
    fn test_snapshot_clamps_confidence() {
        let snap = RegimeSnapshot::new(MarketRegime::LowVolRange, 1.7, 0);
        assert_eq!(snap.confidence, 1.0);
        let snap = RegimeSnapshot::new(MarketRegime::LowVolRange, -0.2, 0);
        assert_eq!(snap.confidence, 0.0);
    }

    #[test]
    fn test_regime_roundtrip() {
        for regime in MarketRegime::ALL {
            let parsed: MarketRegime = regime.to_string().parse().unwrap();
            assert_eq!(parsed, regime);
        }
    }
}

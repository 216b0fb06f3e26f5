use crate::domain::regime::MarketRegime;
use crate::domain::types::{AssetGroup, PatternType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Relative weights of the four composite sub-strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub trend: f64,
    pub mean_reversion: f64,
    pub breakout: f64,
    pub volume: f64,
}

impl StrategyWeights {
    pub fn sum(&self) -> f64 {
        self.trend + self.mean_reversion + self.breakout + self.volume
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            trend: 0.35,
            mean_reversion: 0.2,
            breakout: 0.25,
            volume: 0.2,
        }
    }
}

/// Immutable bundle of tunable scoring parameters. The adaptive controller
/// publishes a new version; readers pin one `Arc` at the start of each tick
/// and never observe a mid-tick change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub version: u64,
    pub as_of: i64,
    pub threshold_soft: f64,
    pub threshold_strict: f64,
    pub quality_min: f64,
    pub min_composite_confidence: f64,
    /// Adaptive overlay on the static per-regime threshold multiplier.
    pub threshold_mult: HashMap<MarketRegime, f64>,
    /// Composite sub-strategy weights per regime and asset group.
    pub strategy_weights: HashMap<MarketRegime, HashMap<AssetGroup, StrategyWeights>>,
    /// Per-pattern score weight per regime, tuned from trade outcomes.
    pub pattern_weights: HashMap<MarketRegime, HashMap<PatternType, f64>>,
}

impl ParameterSnapshot {
    /// Effective raw-score threshold for a regime: the configured soft
    /// threshold scaled by the static regime multiplier and the adaptive
    /// overlay.
    pub fn effective_threshold(&self, regime: MarketRegime) -> f64 {
        let adaptive = self.threshold_mult.get(&regime).copied().unwrap_or(1.0);
        self.threshold_soft * regime.multipliers().threshold * adaptive
    }

    pub fn weights_for(&self, regime: MarketRegime, group: AssetGroup) -> StrategyWeights {
        self.strategy_weights
            .get(&regime)
            .and_then(|per_group| per_group.get(&group))
            .copied()
            .unwrap_or_default()
    }

    pub fn pattern_weight(&self, regime: MarketRegime, pattern: PatternType) -> f64 {
        self.pattern_weights
            .get(&regime)
            .and_then(|per_pattern| per_pattern.get(&pattern))
            .copied()
            .unwrap_or(1.0)
    }

    /// Baseline snapshot used before the controller has produced anything.
    pub fn baseline(threshold_soft: f64, threshold_strict: f64, quality_min: f64, min_composite_confidence: f64) -> Self {
        let mut threshold_mult = HashMap::new();
        for regime in MarketRegime::ALL {
            threshold_mult.insert(regime, 1.0);
        }
        Self {
            version: 0,
            as_of: 0,
            threshold_soft,
            threshold_strict,
            quality_min,
            min_composite_confidence,
            threshold_mult,
            strategy_weights: HashMap::new(),
            pattern_weights: HashMap::new(),
        }
    }
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self::baseline(15.0, 25.0, 0.55, 0.35)
    }
}

/// Holder for the current snapshot. Readers take one `Arc` per tick;
/// publishing swaps the pointer without touching readers in flight.
pub struct ParamStore {
    inner: RwLock<Arc<ParameterSnapshot>>,
}

impl ParamStore {
    pub fn new(initial: ParameterSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(initial)),
        }
    }

    pub async fn current(&self) -> Arc<ParameterSnapshot> {
        self.inner.read().await.clone()
    }

    pub async fn publish(&self, snapshot: ParameterSnapshot) {
        *self.inner.write().await = Arc::new(snapshot);
    }
}

//! The ordered, short-circuiting gate pipeline.
//!
//! Every gate returns pass or block with a reason code; the first block
//! terminates evaluation for that symbol and the whole run is recorded in
//! a per-tick trace for diagnostics. Order is load-bearing: cheap data
//! checks run first, the stateful correlation and duplicate checks last.

mod anomaly;
mod btc_regime;
mod correlation_gate;
mod direction;
mod duplicate;
mod ema_pattern;
mod mtf;
mod pipeline;
mod quality;
mod score;
mod validation;
mod volatility;
mod volume;

pub use anomaly::AnomalyGate;
pub use btc_regime::BtcRegimeGate;
pub use correlation_gate::CorrelationGate;
pub use direction::DirectionCheckGate;
pub use duplicate::{DuplicateGuard, DuplicateSignalGate};
pub use ema_pattern::EmaPatternGate;
pub use mtf::MtfConfirmationGate;
pub use pipeline::{FilterPipeline, PipelineOutcome};
pub use quality::{QualityGate, quality_score};
pub use score::AiScoreGate;
pub use validation::ValidationGate;
pub use volatility::VolatilityGate;
pub use volume::VolumeGate;

use crate::application::market_data::IndicatorSet;
use crate::config::ScoringConfig;
use crate::domain::parameters::ParameterSnapshot;
use crate::domain::regime::RegimeSnapshot;
use crate::domain::types::{Candle, Interval, SignalCandidate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason codes recorded on a block. Stable strings; they end up in the
/// trace table and in persisted correlation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    StaleData,
    NanInput,
    InsufficientHistory,
    ScoreBelowThreshold,
    AnomalousReturn,
    WickOutlier,
    VolumeOutOfBand,
    VolumeBelowAverage,
    VolatilityOutOfBand,
    PatternPreconditionFailed,
    BtcSideMismatch,
    DirectionUncorroborated,
    QualityBelowMin,
    ConfidenceBelowMin,
    MtfDisagreement,
    Concentration,
    HedgeContradiction,
    GroupQuotaExceeded,
    CooldownActive,
    UserPaused,
    DuplicateSignal,
    DispatchOverflow,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockReason::StaleData => "stale_data",
            BlockReason::NanInput => "nan_input",
            BlockReason::InsufficientHistory => "insufficient_history",
            BlockReason::ScoreBelowThreshold => "score_below_threshold",
            BlockReason::AnomalousReturn => "anomalous_return",
            BlockReason::WickOutlier => "wick_outlier",
            BlockReason::VolumeOutOfBand => "volume_out_of_band",
            BlockReason::VolumeBelowAverage => "volume_below_average",
            BlockReason::VolatilityOutOfBand => "volatility_out_of_band",
            BlockReason::PatternPreconditionFailed => "pattern_precondition_failed",
            BlockReason::BtcSideMismatch => "btc_side_mismatch",
            BlockReason::DirectionUncorroborated => "direction_uncorroborated",
            BlockReason::QualityBelowMin => "quality_below_min",
            BlockReason::ConfidenceBelowMin => "confidence_below_min",
            BlockReason::MtfDisagreement => "mtf_disagreement",
            BlockReason::Concentration => "concentration",
            BlockReason::HedgeContradiction => "hedge_contradiction",
            BlockReason::GroupQuotaExceeded => "group_quota_exceeded",
            BlockReason::CooldownActive => "cooldown_active",
            BlockReason::UserPaused => "user_paused",
            BlockReason::DuplicateSignal => "duplicate_signal",
            BlockReason::DispatchOverflow => "dispatch_overflow",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a single gate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Pass,
    /// Pass, but scale the eventual position size by this factor.
    PassWithPenalty(f64),
    Block(BlockReason),
}

impl GateDecision {
    pub fn is_block(&self) -> bool {
        matches!(self, GateDecision::Block(_))
    }
}

/// Everything a gate may read for one (user, symbol) on one tick. All
/// snapshot references were pinned at tick start; no gate sees a mid-tick
/// parameter or regime change.
pub struct GateContext<'a> {
    pub user_id: i64,
    pub candidate: &'a SignalCandidate,
    pub candles: &'a [Candle],
    pub ind: &'a IndicatorSet,
    pub htf_candles: &'a [Candle],
    pub regime: &'a RegimeSnapshot,
    pub params: &'a ParameterSnapshot,
    pub scoring: &'a ScoringConfig,
    pub interval: Interval,
    pub now: i64,
}

#[async_trait]
pub trait SignalGate: Send + Sync {
    /// Stage name as it appears in the filter trace.
    fn name(&self) -> &'static str;

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision;
}

/// One row of the per-tick filter trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub stage: &'static str,
    pub passed: bool,
    pub reason: Option<BlockReason>,
    pub metrics: serde_json::Value,
}

/// The ordered evaluation record for one (user, symbol) in one tick.
#[derive(Debug, Clone, Serialize)]
pub struct FilterTrace {
    pub tick_id: u64,
    pub user_id: i64,
    pub symbol: String,
    pub entries: Vec<TraceEntry>,
    pub blocked: Option<BlockReason>,
}

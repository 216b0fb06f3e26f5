use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::domain::regime::MarketRegime;
use crate::domain::types::Side;
use async_trait::async_trait;

/// Gate 7: the signal side must not fight the BTC regime. Longs are
/// blocked in CRASH and BEAR_TREND, shorts in BULL_TREND, unless the
/// regime call itself is above the override confidence.
pub struct BtcRegimeGate {
    pub override_confidence: f64,
}

impl Default for BtcRegimeGate {
    fn default() -> Self {
        Self {
            override_confidence: 0.9,
        }
    }
}

#[async_trait]
impl SignalGate for BtcRegimeGate {
    fn name(&self) -> &'static str {
        "btc_filter"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let against = match (ctx.candidate.side, ctx.regime.regime) {
            (Side::Long, MarketRegime::Crash | MarketRegime::BearTrend) => true,
            (Side::Short, MarketRegime::BullTrend) => true,
            _ => false,
        };
        if against && ctx.regime.confidence <= self.override_confidence {
            return GateDecision::Block(BlockReason::BtcSideMismatch);
        }
        GateDecision::Pass
    }
}

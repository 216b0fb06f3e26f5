use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use async_trait::async_trait;

/// Gate 5: realized volatility inside the tradable band. Too quiet and the
/// targets never fill; too wild and the stop math is meaningless.
pub struct VolatilityGate;

#[async_trait]
impl SignalGate for VolatilityGate {
    fn name(&self) -> &'static str {
        "volatility"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let vol = ctx.candidate.volatility_pct;
        if vol < ctx.scoring.volatility_min_pct || vol > ctx.scoring.volatility_max_pct {
            return GateDecision::Block(BlockReason::VolatilityOutOfBand);
        }
        GateDecision::Pass
    }
}

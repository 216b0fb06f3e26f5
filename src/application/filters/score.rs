use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use async_trait::async_trait;
use tracing::debug;

/// Gate 2: the raw score must clear the soft threshold scaled by the
/// regime's threshold multiplier (static table times adaptive overlay).
pub struct AiScoreGate;

#[async_trait]
impl SignalGate for AiScoreGate {
    fn name(&self) -> &'static str {
        "ai_score"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let threshold = ctx.params.effective_threshold(ctx.regime.regime);
        if ctx.candidate.raw_score < threshold {
            debug!(
                "ai_score block for {}: {:.1} < {:.1} ({})",
                ctx.candidate.symbol, ctx.candidate.raw_score, threshold, ctx.regime.regime
            );
            return GateDecision::Block(BlockReason::ScoreBelowThreshold);
        }
        GateDecision::Pass
    }
}

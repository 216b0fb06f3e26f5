use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use async_trait::async_trait;

/// Gate 4: 24h USD volume inside the admission band, and recent volume
/// holding up against its rolling mean. Thin or washed-out books produce
/// signals that cannot be followed.
pub struct VolumeGate;

#[async_trait]
impl SignalGate for VolumeGate {
    fn name(&self) -> &'static str {
        "volume"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let usd = ctx.ind.volume_usd_24h;
        if usd < ctx.scoring.volume_min_usd || usd > ctx.scoring.volume_max_usd {
            return GateDecision::Block(BlockReason::VolumeOutOfBand);
        }

        let stats = &ctx.ind.volume;
        if stats.mean > 0.0 && stats.last < stats.mean * ctx.scoring.volume_vs_mean_min {
            return GateDecision::Block(BlockReason::VolumeBelowAverage);
        }

        GateDecision::Pass
    }
}

use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::application::market_data::IndicatorSet;
use async_trait::async_trait;

/// Gate 1: candle freshness, finite inputs, minimum history. Catches the
/// cheap structural problems before anything interesting runs.
pub struct ValidationGate;

#[async_trait]
impl SignalGate for ValidationGate {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.candles.len() < IndicatorSet::warmup() {
            return GateDecision::Block(BlockReason::InsufficientHistory);
        }

        let newest = match ctx.candles.last() {
            Some(c) => c,
            None => return GateDecision::Block(BlockReason::InsufficientHistory),
        };
        if ctx.now - newest.timestamp > 2 * ctx.interval.secs() {
            return GateDecision::Block(BlockReason::StaleData);
        }

        let ind = ctx.ind;
        let finite = ind.ema_fast.is_finite()
            && ind.ema_slow.is_finite()
            && ind.rsi.is_finite()
            && ind.macd.macd.is_finite()
            && ind.realized_vol_pct.is_finite()
            && ctx.candidate.raw_score.is_finite();
        if !finite {
            return GateDecision::Block(BlockReason::NanInput);
        }

        GateDecision::Pass
    }
}

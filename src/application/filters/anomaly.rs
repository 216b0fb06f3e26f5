use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Gate 3: rejects candles that look like bad prints or liquidation spikes.
/// A last-return z-score at or beyond the ceiling, or a wick longer than
/// a few ATRs, is not something to trade on.
pub struct AnomalyGate;

#[async_trait]
impl SignalGate for AnomalyGate {
    fn name(&self) -> &'static str {
        "anomaly_filter"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.ind.last_return_zscore.abs() >= ctx.scoring.anomaly_zscore_max {
            return GateDecision::Block(BlockReason::AnomalousReturn);
        }

        let newest = match ctx.candles.last() {
            Some(c) => c,
            None => return GateDecision::Block(BlockReason::InsufficientHistory),
        };
        let atr = ctx.ind.atr;
        if atr > Decimal::ZERO {
            let body_high = newest.open.max(newest.close);
            let body_low = newest.open.min(newest.close);
            let upper_wick = newest.high - body_high;
            let lower_wick = body_low - newest.low;
            let max_wick = Decimal::from_f64(ctx.scoring.anomaly_wick_atr_max)
                .unwrap_or(Decimal::from(5))
                * atr;
            if upper_wick > max_wick || lower_wick > max_wick {
                return GateDecision::Block(BlockReason::WickOutlier);
            }
        }

        GateDecision::Pass
    }
}

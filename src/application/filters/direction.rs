use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::domain::types::Side;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

/// Gate 8: at least three of four corroborating conditions must side with
/// the candidate: EMA alignment, RSI side, MACD side, price vs trend EMA.
pub struct DirectionCheckGate {
    pub required: usize,
}

impl Default for DirectionCheckGate {
    fn default() -> Self {
        Self { required: 3 }
    }
}

#[async_trait]
impl SignalGate for DirectionCheckGate {
    fn name(&self) -> &'static str {
        "direction_check"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let ind = ctx.ind;
        let price = ctx.candidate.entry.to_f64().unwrap_or(0.0);

        let checks = match ctx.candidate.side {
            Side::Long => [
                ind.ema_fast > ind.ema_slow,
                ind.rsi > 50.0,
                ind.macd.macd > ind.macd.signal,
                price > ind.ema_trend,
            ],
            Side::Short => [
                ind.ema_fast < ind.ema_slow,
                ind.rsi < 50.0,
                ind.macd.macd < ind.macd.signal,
                price < ind.ema_trend,
            ],
        };

        let corroborating = checks.iter().filter(|&&c| c).count();
        if corroborating < self.required {
            return GateDecision::Block(BlockReason::DirectionUncorroborated);
        }
        GateDecision::Pass
    }
}

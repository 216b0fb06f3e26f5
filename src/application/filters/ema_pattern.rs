use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::domain::types::{PatternType, Side};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

/// Gate 6: pattern-specific indicator preconditions. Each pattern has a
/// structural claim behind it; this re-checks the claim still holds on the
/// final snapshot (detectors and gates may see the store seconds apart on
/// a busy tick).
pub struct EmaPatternGate;

#[async_trait]
impl SignalGate for EmaPatternGate {
    fn name(&self) -> &'static str {
        "ema_pattern"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let ind = ctx.ind;
        let side = ctx.candidate.side;
        let price = match ctx.candidate.entry.to_f64() {
            Some(p) if p > 0.0 => p,
            _ => return GateDecision::Block(BlockReason::NanInput),
        };

        let holds = match ctx.candidate.pattern {
            PatternType::EmaCross => match side {
                Side::Long => ind.ema_fast > ind.ema_slow,
                Side::Short => ind.ema_fast < ind.ema_slow,
            },
            PatternType::MomentumDivergence => match side {
                // The divergence premise: momentum already leaning against
                // the prior move.
                Side::Long => ind.macd.histogram > 0.0,
                Side::Short => ind.macd.histogram < 0.0,
            },
            PatternType::RsiExtreme => match side {
                Side::Long => ind.rsi < 50.0,
                Side::Short => ind.rsi > 50.0,
            },
            PatternType::Breakout => match side {
                Side::Long => price >= ind.bollinger.middle,
                Side::Short => price <= ind.bollinger.middle,
            },
            PatternType::MeanReversion => match side {
                Side::Long => price < ind.bollinger.middle,
                Side::Short => price > ind.bollinger.middle,
            },
        };

        if holds {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::PatternPreconditionFailed)
        }
    }
}

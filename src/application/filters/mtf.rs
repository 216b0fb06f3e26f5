use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::application::market_data::indicators::{self, ema_series};
use crate::domain::types::Side;
use async_trait::async_trait;

/// Gate 10: higher-timeframe confirmation. The 4h EMA(50) direction must
/// agree with the candidate side. With too little higher-timeframe history
/// the gate abstains rather than blocks.
pub struct MtfConfirmationGate {
    pub ema_period: usize,
    pub slope_window: usize,
}

impl Default for MtfConfirmationGate {
    fn default() -> Self {
        Self {
            ema_period: 50,
            slope_window: 3,
        }
    }
}

#[async_trait]
impl SignalGate for MtfConfirmationGate {
    fn name(&self) -> &'static str {
        "mtf_confirmation"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        if ctx.htf_candles.len() < self.ema_period + self.slope_window {
            return GateDecision::Pass;
        }
        let closes = indicators::closes(ctx.htf_candles);
        let ema = match ema_series(&closes, self.ema_period) {
            Ok(series) => series,
            Err(_) => return GateDecision::Pass,
        };
        let newest = ema[ema.len() - 1];
        let older = ema[ema.len() - 1 - self.slope_window];
        let rising = newest > older;

        let agrees = match ctx.candidate.side {
            Side::Long => rising,
            Side::Short => !rising,
        };
        if agrees {
            GateDecision::Pass
        } else {
            GateDecision::Block(BlockReason::MtfDisagreement)
        }
    }
}

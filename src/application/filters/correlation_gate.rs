use crate::application::filters::{GateContext, GateDecision, SignalGate};
use crate::application::market_data::CandleStore;
use crate::application::risk::{CorrelationManager, RiskDecision};
use crate::domain::ports::{CorrelationEvent, PersistencePort};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Gate 11: delegates to the correlation risk manager and records the
/// decision as a correlation event for diagnostics.
pub struct CorrelationGate {
    manager: Arc<CorrelationManager>,
    store: Arc<CandleStore>,
    persistence: Arc<dyn PersistencePort>,
}

impl CorrelationGate {
    pub fn new(
        manager: Arc<CorrelationManager>,
        store: Arc<CandleStore>,
        persistence: Arc<dyn PersistencePort>,
    ) -> Self {
        Self {
            manager,
            store,
            persistence,
        }
    }
}

#[async_trait]
impl SignalGate for CorrelationGate {
    fn name(&self) -> &'static str {
        "correlation_risk"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let decision = self
            .manager
            .check(
                ctx.user_id,
                &ctx.candidate.symbol,
                ctx.candidate.side,
                &self.store,
                ctx.interval,
                ctx.now,
            )
            .await;

        let event = CorrelationEvent {
            user_id: ctx.user_id,
            symbol: ctx.candidate.symbol.clone(),
            side: ctx.candidate.side,
            decision: decision.decision_label().to_string(),
            reason: decision.block_reason().map(|r| r.to_string()),
            timestamp: ctx.now,
        };
        if let Err(e) = self.persistence.record_correlation_event(&event).await {
            warn!("Failed to record correlation event: {:#}", e);
        }

        match decision {
            RiskDecision::Allow => GateDecision::Pass,
            RiskDecision::AllowWithPenalty(penalty) => GateDecision::PassWithPenalty(penalty),
            RiskDecision::Block(reason) => GateDecision::Block(reason),
        }
    }
}

use crate::application::filters::{
    AiScoreGate, AnomalyGate, BlockReason, BtcRegimeGate, CorrelationGate, DirectionCheckGate,
    DuplicateGuard, DuplicateSignalGate, EmaPatternGate, FilterTrace, GateContext, GateDecision,
    MtfConfirmationGate, QualityGate, SignalGate, TraceEntry, ValidationGate, VolatilityGate,
    VolumeGate,
};
use crate::application::market_data::CandleStore;
use crate::application::risk::CorrelationManager;
use crate::domain::ports::PersistencePort;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Result of running one candidate through the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// All gates passed; carry the accumulated size penalty (1.0 = none).
    Passed { penalty: f64 },
    Blocked { stage: &'static str, reason: BlockReason },
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, PipelineOutcome::Passed { .. })
    }
}

/// The ordered gate sequence. Unlike a priority-sorted pipeline, the order
/// here is fixed by construction: it is part of the contract (cheap data
/// checks before stateful risk checks) and blocks short-circuit.
pub struct FilterPipeline {
    gates: Vec<Box<dyn SignalGate>>,
}

impl FilterPipeline {
    pub fn new(gates: Vec<Box<dyn SignalGate>>) -> Self {
        Self { gates }
    }

    /// The standard 12-gate pipeline in spec order.
    pub fn standard(
        correlation: Arc<CorrelationManager>,
        store: Arc<CandleStore>,
        persistence: Arc<dyn PersistencePort>,
        duplicate_guard: Arc<DuplicateGuard>,
    ) -> Self {
        Self::new(vec![
            Box::new(ValidationGate),
            Box::new(AiScoreGate),
            Box::new(AnomalyGate),
            Box::new(VolumeGate),
            Box::new(VolatilityGate),
            Box::new(EmaPatternGate),
            Box::new(BtcRegimeGate::default()),
            Box::new(DirectionCheckGate::default()),
            Box::new(QualityGate),
            Box::new(MtfConfirmationGate::default()),
            Box::new(CorrelationGate::new(correlation, store, persistence)),
            Box::new(DuplicateSignalGate::new(duplicate_guard)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Evaluates gates in order, recording a trace row per gate. The first
    /// block terminates; no downstream gate runs after it.
    pub async fn run(&self, tick_id: u64, ctx: &GateContext<'_>) -> (PipelineOutcome, FilterTrace) {
        let mut entries = Vec::with_capacity(self.gates.len());
        let mut penalty = 1.0f64;

        for gate in &self.gates {
            let decision = gate.evaluate(ctx).await;
            match decision {
                GateDecision::Pass => {
                    entries.push(TraceEntry {
                        stage: gate.name(),
                        passed: true,
                        reason: None,
                        metrics: json!({}),
                    });
                }
                GateDecision::PassWithPenalty(p) => {
                    penalty *= p.clamp(0.0, 1.0);
                    entries.push(TraceEntry {
                        stage: gate.name(),
                        passed: true,
                        reason: None,
                        metrics: json!({ "penalty": p }),
                    });
                }
                GateDecision::Block(reason) => {
                    debug!(
                        "Gate {} blocked {} {} for user {}: {}",
                        gate.name(),
                        ctx.candidate.symbol,
                        ctx.candidate.side,
                        ctx.user_id,
                        reason
                    );
                    entries.push(TraceEntry {
                        stage: gate.name(),
                        passed: false,
                        reason: Some(reason),
                        metrics: json!({
                            "raw_score": ctx.candidate.raw_score,
                            "regime": ctx.regime.regime.to_string(),
                        }),
                    });
                    let trace = FilterTrace {
                        tick_id,
                        user_id: ctx.user_id,
                        symbol: ctx.candidate.symbol.clone(),
                        entries,
                        blocked: Some(reason),
                    };
                    return (
                        PipelineOutcome::Blocked {
                            stage: gate.name(),
                            reason,
                        },
                        trace,
                    );
                }
            }
        }

        let trace = FilterTrace {
            tick_id,
            user_id: ctx.user_id,
            symbol: ctx.candidate.symbol.clone(),
            entries,
            blocked: None,
        };
        (PipelineOutcome::Passed { penalty }, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::filters::{GateContext, GateDecision, SignalGate};
    use crate::application::market_data::IndicatorSet;
    use crate::application::strategies::testkit::{ramp_candles, set_from};
    use crate::config::ScoringConfig;
    use crate::domain::parameters::ParameterSnapshot;
    use crate::domain::regime::{MarketRegime, RegimeSnapshot};
    use crate::domain::types::{Candle, Interval, PatternType, Side, SignalCandidate};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FixedGate {
        name: &'static str,
        decision: GateDecision,
    }

    #[async_trait]
    impl SignalGate for FixedGate {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn evaluate(&self, _ctx: &GateContext<'_>) -> GateDecision {
            self.decision.clone()
        }
    }

    fn candidate() -> SignalCandidate {
        SignalCandidate {
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry: dec!(2500),
            pattern: PatternType::EmaCross,
            raw_score: 40.0,
            regime_at_gen: MarketRegime::BullTrend,
            composite_score: 0.8,
            composite_confidence: 0.85,
            quality_score: 0.75,
            pattern_confidence: 0.7,
            atr: dec!(12),
            volatility_pct: 2.0,
            candle_t: 0,
        }
    }

    fn run_ctx<'a>(
        candles: &'a [Candle],
        ind: &'a IndicatorSet,
        candidate: &'a SignalCandidate,
        regime: &'a RegimeSnapshot,
        params: &'a ParameterSnapshot,
        scoring: &'a ScoringConfig,
    ) -> GateContext<'a> {
        GateContext {
            user_id: 1,
            candidate,
            candles,
            ind,
            htf_candles: &[],
            regime,
            params,
            scoring,
            interval: Interval::H1,
            now: candles.last().map(|c| c.timestamp).unwrap_or(0),
        }
    }

    #[tokio::test]
    async fn test_block_short_circuits() {
        let pipeline = FilterPipeline::new(vec![
            Box::new(FixedGate { name: "a", decision: GateDecision::Pass }),
            Box::new(FixedGate {
                name: "b",
                decision: GateDecision::Block(BlockReason::ScoreBelowThreshold),
            }),
            Box::new(FixedGate { name: "c", decision: GateDecision::Pass }),
        ]);
        let candles = ramp_candles(80, 2500.0, 1.0);
        let ind = set_from(&candles);
        let cand = candidate();
        let regime = RegimeSnapshot::new(MarketRegime::BullTrend, 0.85, 0);
        let params = ParameterSnapshot::default();
        let scoring = ScoringConfig::default();
        let ctx = run_ctx(&candles, &ind, &cand, &regime, &params, &scoring);

        let (outcome, trace) = pipeline.run(7, &ctx).await;
        assert_eq!(
            outcome,
            PipelineOutcome::Blocked {
                stage: "b",
                reason: BlockReason::ScoreBelowThreshold
            }
        );
        // Gate c never evaluated.
        assert_eq!(trace.entries.len(), 2);
        assert_eq!(trace.entries.last().unwrap().stage, "b");
        assert_eq!(trace.blocked, Some(BlockReason::ScoreBelowThreshold));
        assert_eq!(trace.tick_id, 7);
    }

    #[tokio::test]
    async fn test_penalties_multiply() {
        let pipeline = FilterPipeline::new(vec![
            Box::new(FixedGate {
                name: "a",
                decision: GateDecision::PassWithPenalty(0.8),
            }),
            Box::new(FixedGate {
                name: "b",
                decision: GateDecision::PassWithPenalty(0.9),
            }),
        ]);
        let candles = ramp_candles(80, 2500.0, 1.0);
        let ind = set_from(&candles);
        let cand = candidate();
        let regime = RegimeSnapshot::new(MarketRegime::BullTrend, 0.85, 0);
        let params = ParameterSnapshot::default();
        let scoring = ScoringConfig::default();
        let ctx = run_ctx(&candles, &ind, &cand, &regime, &params, &scoring);

        let (outcome, trace) = pipeline.run(1, &ctx).await;
        match outcome {
            PipelineOutcome::Passed { penalty } => {
                assert!((penalty - 0.72).abs() < 1e-9);
            }
            other => panic!("expected pass, got {:?}", other),
        }
        assert!(trace.blocked.is_none());
    }

    #[tokio::test]
    async fn test_crash_regime_scenario_trace() {
        // Scenario: CRASH regime (conf 0.7), LONG candidate with raw score
        // 40 and soft threshold 15. The score gate passes at 22.5; the BTC
        // filter blocks at stage 7 with btc_side_mismatch.
        let pipeline = FilterPipeline::new(vec![
            Box::new(ValidationGate),
            Box::new(AiScoreGate),
            Box::new(AnomalyGate),
            Box::new(VolumeGate),
            Box::new(VolatilityGate),
            Box::new(EmaPatternGate),
            Box::new(BtcRegimeGate::default()),
            Box::new(DirectionCheckGate::default()),
        ]);
        let candles = ramp_candles(80, 2500.0, 1.0);
        let mut ind = set_from(&candles);
        // Healthy volume so the volume gate is not the blocker.
        ind.volume_usd_24h = 50_000_000.0;
        ind.volume.mean = 1000.0;
        ind.volume.last = 1200.0;
        let cand = candidate();
        let regime = RegimeSnapshot::new(MarketRegime::Crash, 0.7, 0);
        let params = ParameterSnapshot::default();
        let scoring = ScoringConfig::default();
        let ctx = run_ctx(&candles, &ind, &cand, &regime, &params, &scoring);

        let (outcome, trace) = pipeline.run(1, &ctx).await;
        assert_eq!(
            outcome,
            PipelineOutcome::Blocked {
                stage: "btc_filter",
                reason: BlockReason::BtcSideMismatch
            }
        );
        // Stages 1-6 passed, stage 7 blocked: exactly 7 rows.
        assert_eq!(trace.entries.len(), 7);
        assert!(trace.entries[1].passed, "ai_score must pass 40 >= 22.5");
        assert_eq!(trace.entries[6].stage, "btc_filter");
    }
}

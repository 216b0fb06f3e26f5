//! Signal emitter: turns a pipeline-approved candidate into a sized,
//! levelled, persisted and dispatched signal.
//!
//! Persistence is idempotent by (user, symbol, side, candle); a restart
//! replaying the same tick saves nothing twice and never re-notifies.

use crate::application::filters::DuplicateGuard;
use crate::application::risk::{CorrelationManager, PositionSizer};
use crate::application::signal::dispatcher::{DispatchPayload, NotificationDispatcher};
use crate::config::{LifecycleConfig, ScoringConfig};
use crate::domain::ports::{PersistencePort, SignalNotification};
use crate::domain::regime::RegimeSnapshot;
use crate::domain::types::{EmittedSignal, Side, SignalCandidate, SignalStatus};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Stop and targets from entry, ATR and the regime's width multipliers.
/// LONG: `sl = entry - k_sl * atr * slMult`, targets above; SHORT mirrored.
pub fn compute_levels(
    side: Side,
    entry: Decimal,
    atr: Decimal,
    regime: &RegimeSnapshot,
    config: &LifecycleConfig,
) -> (Decimal, Decimal, Decimal) {
    let sl_mult = Decimal::from_f64(config.k_sl * regime.multipliers.sl).unwrap_or(Decimal::ONE);
    let tp1_mult = Decimal::from_f64(config.k_tp1 * regime.multipliers.tp).unwrap_or(Decimal::ONE);
    let tp2_mult = Decimal::from_f64(config.k_tp2 * regime.multipliers.tp).unwrap_or(Decimal::ONE);

    let sign = side.sign();
    let sl = entry - sign * atr * sl_mult;
    let tp1 = entry + sign * atr * tp1_mult;
    let tp2 = entry + sign * atr * tp2_mult;
    (sl, tp1, tp2)
}

pub struct SignalEmitter {
    persistence: Arc<dyn PersistencePort>,
    dispatcher: Arc<NotificationDispatcher>,
    duplicate_guard: Arc<DuplicateGuard>,
    correlation: Arc<CorrelationManager>,
    sizer: PositionSizer,
    lifecycle: LifecycleConfig,
    scoring: ScoringConfig,
}

impl SignalEmitter {
    pub fn new(
        persistence: Arc<dyn PersistencePort>,
        dispatcher: Arc<NotificationDispatcher>,
        duplicate_guard: Arc<DuplicateGuard>,
        correlation: Arc<CorrelationManager>,
        sizer: PositionSizer,
        lifecycle: LifecycleConfig,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            persistence,
            dispatcher,
            duplicate_guard,
            correlation,
            sizer,
            lifecycle,
            scoring,
        }
    }

    /// Sizes, levels, persists and dispatches one approved candidate.
    /// Returns `None` when the candidate was dropped (invalid levels) or
    /// already persisted (idempotent replay).
    pub async fn emit(
        &self,
        user_id: i64,
        candidate: &SignalCandidate,
        regime: &RegimeSnapshot,
        correlation_penalty: f64,
        now: i64,
    ) -> Result<Option<EmittedSignal>> {
        let adaptive = self.sizer.adaptive_multiplier(
            candidate.composite_score,
            candidate.quality_score,
            regime,
            candidate.volatility_pct,
            &self.scoring,
        );
        let size_usdt = self
            .sizer
            .size_usdt(regime, adaptive, correlation_penalty)
            .round_dp(2);

        let (sl, tp1, tp2) =
            compute_levels(candidate.side, candidate.entry, candidate.atr, regime, &self.lifecycle);

        let signal = EmittedSignal {
            id: Uuid::new_v4(),
            user_id,
            candidate: candidate.clone(),
            sl,
            tp1,
            tp2,
            size_usdt,
            leverage: self.sizer.leverage(),
            status: SignalStatus::Pending,
            message_ref: None,
        };

        if let Err(violation) = signal.validate_levels() {
            // Contract violation: log with full context and drop. Never emit.
            error!("Dropping candidate with invalid levels: {}", violation);
            return Ok(None);
        }

        let inserted = self.persistence.save_signal(&signal).await?;
        if !inserted {
            info!(
                "Signal already persisted for {} {} @ candle {}, skipping dispatch",
                candidate.symbol, candidate.side, candidate.candle_t
            );
            return Ok(None);
        }

        self.duplicate_guard
            .record(user_id, &candidate.symbol, candidate.side, now);
        self.correlation
            .record_signal(user_id, &candidate.symbol, candidate.side, now)
            .await;

        let notification = SignalNotification {
            signal_id: signal.id,
            symbol: candidate.symbol.clone(),
            side: candidate.side,
            entry: candidate.entry,
            sl,
            tp1,
            tp2,
            size_usdt,
            leverage: signal.leverage,
            confidence: candidate.composite_confidence,
        };
        // A full queue drops the ping; the signal itself is already safe.
        self.dispatcher.enqueue(DispatchPayload::New {
            user_id,
            signal_id: signal.id,
            notification,
        });

        info!(
            "Emitted {} {} entry={} sl={} tp1={} tp2={} size={} ({})",
            candidate.symbol, candidate.side, candidate.entry, sl, tp1, tp2, size_usdt, regime.regime
        );
        Ok(Some(signal))
    }
}

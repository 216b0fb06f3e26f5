//! Outcome recorder: exactly one trade result per closed position.
//!
//! Idempotent twice over: an in-memory guard catches same-process
//! replays, and the persistence layer's signal-id key catches everything
//! else. A duplicate write is an invariant alert, not an error.

use crate::domain::ports::PersistencePort;
use crate::domain::position::Position;
use crate::domain::trade_result::TradeResult;
use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub struct OutcomeRecorder {
    persistence: Arc<dyn PersistencePort>,
    recorded: Mutex<HashSet<Uuid>>,
}

impl OutcomeRecorder {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self {
            persistence,
            recorded: Mutex::new(HashSet::new()),
        }
    }

    /// Writes the trade result for a terminal position. Returns `None`
    /// when the result was already recorded.
    pub async fn record(
        &self,
        position: &Position,
        exit_price: Decimal,
        now: i64,
    ) -> Result<Option<TradeResult>> {
        if !position.is_terminal() {
            warn!(
                "Refusing to record outcome for non-terminal position {}",
                position.signal_id
            );
            return Ok(None);
        }

        {
            let mut recorded = self.recorded.lock().await;
            if !recorded.insert(position.signal_id) {
                return Ok(None);
            }
        }

        let result = TradeResult::from_position(position, exit_price, now);
        let inserted = self.persistence.save_trade_result(&result).await?;
        if !inserted {
            // Second writer lost the race across restarts; the first write
            // stands and this one is a no-op, raised as an alert.
            warn!(
                "Duplicate trade result suppressed for signal {}",
                position.signal_id
            );
            return Ok(None);
        }

        info!(
            "Trade result recorded: {} {} {} pnl={:.2}% ({})",
            result.symbol, result.side, result.pattern, result.pnl_pct, result.market_regime
        );
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{PositionStatus, SignalAttribution};
    use crate::domain::regime::MarketRegime;
    use crate::domain::types::{PatternType, Side};
    use crate::infrastructure::in_memory::InMemoryPersistence;
    use rust_decimal_macros::dec;

    fn closed_position() -> Position {
        let mut p = Position {
            signal_id: Uuid::new_v4(),
            user_id: 1,
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry: dec!(2500),
            initial_size: dec!(100),
            remaining_size: Decimal::ZERO,
            current_sl: dec!(2507.5),
            tp1: dec!(2540),
            tp2: dec!(2600),
            tp1_hit: true,
            trailing_active: true,
            high_water_mark: dec!(2605),
            realized_return_pct: dec!(2.8),
            opened_at: 0,
            last_update: 3600,
            status: PositionStatus::ClosedTp,
            message_ref: None,
            attribution: SignalAttribution {
                pattern: PatternType::EmaCross,
                raw_score: 40.0,
                regime_at_gen: MarketRegime::BullTrend,
                composite_score: 0.8,
                composite_confidence: 0.85,
                volume_usd: 1e7,
                volatility_pct: 2.0,
            },
        };
        p.status = PositionStatus::ClosedTp;
        p
    }

    #[tokio::test]
    async fn test_records_exactly_once() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let recorder = OutcomeRecorder::new(persistence.clone());
        let position = closed_position();

        let first = recorder.record(&position, dec!(2605), 3600).await.unwrap();
        assert!(first.is_some());

        let second = recorder.record(&position, dec!(2605), 3600).await.unwrap();
        assert!(second.is_none());

        let results = persistence.load_trade_results_since(0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].pnl_pct - 2.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejects_open_position() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let recorder = OutcomeRecorder::new(persistence.clone());
        let mut position = closed_position();
        position.status = PositionStatus::Open;
        position.remaining_size = dec!(100);

        let result = recorder.record(&position, dec!(2605), 3600).await.unwrap();
        assert!(result.is_none());
        assert!(persistence.load_trade_results_since(0).await.unwrap().is_empty());
    }
}

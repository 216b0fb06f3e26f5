//! In-memory persistence adapter. Thread-safe, async-ready, idempotent on
//! the same keys as the SQLite adapter; backs unit tests and the mock
//! server mode.

use crate::domain::parameters::ParameterSnapshot;
use crate::domain::ports::{CorrelationEvent, MessageRef, PersistencePort};
use crate::domain::position::Position;
use crate::domain::trade_result::TradeResult;
use crate::domain::types::{EmittedSignal, Side};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    signals: HashMap<Uuid, EmittedSignal>,
    signal_keys: HashMap<(i64, String, Side, i64), Uuid>,
    positions: HashMap<Uuid, Position>,
    trade_results: HashMap<Uuid, TradeResult>,
    parameter_snapshots: Vec<ParameterSnapshot>,
    correlation_events: Vec<CorrelationEvent>,
}

#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    store: Arc<RwLock<Store>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signal(&self, id: Uuid) -> Option<EmittedSignal> {
        self.store.read().await.signals.get(&id).cloned()
    }

    pub async fn signal_count(&self) -> usize {
        self.store.read().await.signals.len()
    }

    pub async fn correlation_events(&self) -> Vec<CorrelationEvent> {
        self.store.read().await.correlation_events.clone()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn save_signal(&self, signal: &EmittedSignal) -> Result<bool> {
        let mut store = self.store.write().await;
        let key = signal.dedup_key();
        if store.signal_keys.contains_key(&key) {
            return Ok(false);
        }
        store.signal_keys.insert(key, signal.id);
        store.signals.insert(signal.id, signal.clone());
        Ok(true)
    }

    async fn attach_message_ref(&self, signal_id: Uuid, message_ref: &MessageRef) -> Result<()> {
        let mut store = self.store.write().await;
        if let Some(signal) = store.signals.get_mut(&signal_id) {
            signal.message_ref = Some(message_ref.0.clone());
        }
        Ok(())
    }

    async fn load_open_positions(&self, user_id: Option<i64>) -> Result<Vec<Position>> {
        let store = self.store.read().await;
        Ok(store
            .positions
            .values()
            .filter(|p| !p.is_terminal())
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .cloned()
            .collect())
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        self.store
            .write()
            .await
            .positions
            .insert(position.signal_id, position.clone());
        Ok(())
    }

    async fn save_trade_result(&self, result: &TradeResult) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.trade_results.contains_key(&result.signal_id) {
            return Ok(false);
        }
        store.trade_results.insert(result.signal_id, result.clone());
        Ok(true)
    }

    async fn load_trade_results_since(&self, since: i64) -> Result<Vec<TradeResult>> {
        let store = self.store.read().await;
        Ok(store
            .trade_results
            .values()
            .filter(|r| r.closed_at >= since)
            .cloned()
            .collect())
    }

    async fn publish_parameter_snapshot(&self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.store
            .write()
            .await
            .parameter_snapshots
            .push(snapshot.clone());
        Ok(())
    }

    async fn load_parameter_snapshot(&self) -> Result<Option<ParameterSnapshot>> {
        Ok(self
            .store
            .read()
            .await
            .parameter_snapshots
            .last()
            .cloned())
    }

    async fn record_correlation_event(&self, event: &CorrelationEvent) -> Result<()> {
        self.store
            .write()
            .await
            .correlation_events
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::regime::MarketRegime;
    use crate::domain::types::{PatternType, SignalCandidate, SignalStatus};
    use rust_decimal_macros::dec;

    fn signal(user_id: i64, candle_t: i64) -> EmittedSignal {
        EmittedSignal {
            id: Uuid::new_v4(),
            user_id,
            candidate: SignalCandidate {
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
                candle_t,
            },
            sl: dec!(2485.6),
            tp1: dec!(2527),
            tp2: dec!(2554),
            size_usdt: dec!(182),
            leverage: 10,
            status: SignalStatus::Pending,
            message_ref: None,
        }
    }

    #[tokio::test]
    async fn test_save_signal_idempotent_by_composite_key() {
        let persistence = InMemoryPersistence::new();
        let first = signal(1, 1000);
        assert!(persistence.save_signal(&first).await.unwrap());

        // Different UUID, same (user, symbol, side, candle): duplicate.
        let replay = signal(1, 1000);
        assert!(!persistence.save_signal(&replay).await.unwrap());
        assert_eq!(persistence.signal_count().await, 1);

        // Next candle is a fresh signal.
        assert!(persistence.save_signal(&signal(1, 4600)).await.unwrap());
        // Same candle, different user too.
        assert!(persistence.save_signal(&signal(2, 1000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_message_ref() {
        let persistence = InMemoryPersistence::new();
        let s = signal(1, 1000);
        persistence.save_signal(&s).await.unwrap();
        persistence
            .attach_message_ref(s.id, &MessageRef("msg-1".to_string()))
            .await
            .unwrap();
        assert_eq!(
            persistence.signal(s.id).await.unwrap().message_ref,
            Some("msg-1".to_string())
        );
    }
}

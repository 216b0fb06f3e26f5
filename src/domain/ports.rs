//! Port traits bounding the core. Exchange connectivity, user notification,
//! durable storage and model inference all live behind these; the engine
//! never talks to the outside world any other way.

use crate::domain::errors::{ExchangeError, NotifyError};
use crate::domain::parameters::ParameterSnapshot;
use crate::domain::position::{Position, PositionStatus};
use crate::domain::trade_result::TradeResult;
use crate::domain::types::{Candle, EmittedSignal, Interval, Side};
pub use crate::domain::types::PriceQuote;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn fetch_tickers(&self) -> Result<HashMap<String, PriceQuote>, ExchangeError>;

    /// Universe discovery; the scheduler filters the configured symbols
    /// against this list at startup.
    async fn list_symbols(&self) -> Result<Vec<String>, ExchangeError>;
}

/// Opaque handle to a delivered message, returned by the notification
/// adapter and used for follow-up lifecycle edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

/// The rendered payload handed to the notification adapter. The core
/// treats rendering as the adapter's problem; this is the full fact set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalNotification {
    pub signal_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry: Decimal,
    pub sl: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub size_usdt: Decimal,
    pub leverage: u32,
    pub confidence: f64,
}

/// Follow-up patch for an already-delivered signal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleUpdate {
    TrailingAdvanced { new_sl: Decimal },
    Tp1Hit { price: Decimal, new_sl: Decimal },
    Closed { status: PositionStatus, price: Decimal, pnl_pct: f64 },
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn emit(
        &self,
        user_id: i64,
        payload: &SignalNotification,
    ) -> Result<MessageRef, NotifyError>;

    async fn update(
        &self,
        message_ref: &MessageRef,
        patch: &LifecycleUpdate,
    ) -> Result<(), NotifyError>;
}

/// Outcome of a correlation-risk decision, persisted for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEvent {
    pub user_id: i64,
    pub symbol: String,
    pub side: Side,
    pub decision: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Idempotent by `(user_id, symbol, side, candle_t)`. Returns `false`
    /// when the signal was already persisted (the duplicate is a no-op).
    async fn save_signal(&self, signal: &EmittedSignal) -> Result<bool>;

    async fn attach_message_ref(&self, signal_id: Uuid, message_ref: &MessageRef) -> Result<()>;

    /// `None` loads every user's open positions (startup rehydration).
    async fn load_open_positions(&self, user_id: Option<i64>) -> Result<Vec<Position>>;

    async fn save_position(&self, position: &Position) -> Result<()>;

    /// Idempotent by `signal_id`. Returns `false` on a duplicate write,
    /// which callers treat as an invariant alert, not an error.
    async fn save_trade_result(&self, result: &TradeResult) -> Result<bool>;

    async fn load_trade_results_since(&self, since: i64) -> Result<Vec<TradeResult>>;

    async fn publish_parameter_snapshot(&self, snapshot: &ParameterSnapshot) -> Result<()>;

    async fn load_parameter_snapshot(&self) -> Result<Option<ParameterSnapshot>>;

    async fn record_correlation_event(&self, event: &CorrelationEvent) -> Result<()>;
}

/// Optional external scoring model. The engine runs fine without one; the
/// default implementation passes the heuristic score through unchanged.
pub trait ScoringModelPort: Send + Sync {
    /// Returns a score in [0, 1] for a feature vector.
    fn predict(&self, features: &[f64]) -> f64;
}

/// Identity model: keeps the detector's normalized heuristic score.
pub struct PassthroughModel;

impl ScoringModelPort for PassthroughModel {
    fn predict(&self, features: &[f64]) -> f64 {
        features.first().copied().unwrap_or(0.0).clamp(0.0, 1.0)
    }
}

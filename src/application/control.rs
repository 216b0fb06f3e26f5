//! Admin control surface exposed by the engine: pause/resume a user,
//! force-close their book, inspect filter traces and risk state.

use crate::application::filters::FilterTrace;
use crate::application::lifecycle::LifecycleManager;
use crate::application::market_data::CandleStore;
use crate::application::risk::{CorrelationManager, RiskStatus};
use crate::application::scheduler::TraceStore;
use crate::config::UniverseConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ControlPort: Send + Sync {
    async fn pause_user(&self, user_id: i64) -> Result<()>;
    async fn resume_user(&self, user_id: i64) -> Result<()>;
    /// Returns how many positions were closed.
    async fn force_close_all(&self, user_id: i64) -> Result<usize>;
    async fn get_filter_trace(&self, tick_id: u64) -> Option<Vec<FilterTrace>>;
    async fn get_risk_status(&self, user_id: i64) -> RiskStatus;
}

pub struct EngineControl {
    correlation: Arc<CorrelationManager>,
    lifecycle: Arc<LifecycleManager>,
    traces: Arc<TraceStore>,
    store: Arc<CandleStore>,
    universe: UniverseConfig,
}

impl EngineControl {
    pub fn new(
        correlation: Arc<CorrelationManager>,
        lifecycle: Arc<LifecycleManager>,
        traces: Arc<TraceStore>,
        store: Arc<CandleStore>,
        universe: UniverseConfig,
    ) -> Self {
        Self {
            correlation,
            lifecycle,
            traces,
            store,
            universe,
        }
    }
}

#[async_trait]
impl ControlPort for EngineControl {
    async fn pause_user(&self, user_id: i64) -> Result<()> {
        self.correlation.pause_user(user_id).await;
        Ok(())
    }

    async fn resume_user(&self, user_id: i64) -> Result<()> {
        self.correlation.resume_user(user_id).await;
        Ok(())
    }

    async fn force_close_all(&self, user_id: i64) -> Result<usize> {
        // Close at the freshest close we hold per symbol; positions on
        // symbols with no data close at entry (flat).
        let mut prices: HashMap<String, Decimal> = HashMap::new();
        for position in self.lifecycle.open_positions(Some(user_id)).await {
            if let Some(price) = self
                .store
                .last_close(&position.symbol, self.universe.interval)
            {
                prices.insert(position.symbol.clone(), price);
            }
        }
        Ok(self
            .lifecycle
            .force_close_all(user_id, &prices, Utc::now().timestamp())
            .await)
    }

    async fn get_filter_trace(&self, tick_id: u64) -> Option<Vec<FilterTrace>> {
        self.traces.get(tick_id).await
    }

    async fn get_risk_status(&self, user_id: i64) -> RiskStatus {
        self.correlation.snapshot(user_id).await
    }
}

//! Correlation risk manager: per-user open-position registry, pairwise
//! symbol correlation, cooldown history and group quotas.
//!
//! All state mutation is serialized per user behind an async mutex; the
//! pairwise correlation of log-returns is cached per (pair, candle) so a
//! tick touching many users never recomputes it.

use crate::application::filters::BlockReason;
use crate::application::market_data::{CandleStore, indicators};
use crate::config::CorrelationConfig;
use crate::domain::types::{AssetGroup, Interval, Side};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct OpenPositionRef {
    pub symbol: String,
    pub side: Side,
    pub group: AssetGroup,
    pub opened_at: i64,
}

/// Decision handed back to the correlation gate.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Allow,
    AllowWithPenalty(f64),
    Block(BlockReason),
}

impl RiskDecision {
    pub fn decision_label(&self) -> &'static str {
        match self {
            RiskDecision::Allow => "allow",
            RiskDecision::AllowWithPenalty(_) => "allow_with_penalty",
            RiskDecision::Block(_) => "block",
        }
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            RiskDecision::Block(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Observability snapshot for one user.
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub user_id: i64,
    pub paused: bool,
    pub open_positions: Vec<OpenPositionRef>,
    pub positions_by_group: HashMap<String, usize>,
    pub signals_last_24h: usize,
}

#[derive(Debug, Default)]
struct UserRiskState {
    open: Vec<OpenPositionRef>,
    history: VecDeque<(String, Side, i64)>,
    paused: bool,
}

impl UserRiskState {
    fn trim_history(&mut self, now: i64, retention_secs: i64) {
        while let Some(&(_, _, t)) = self.history.front() {
            if now - t > retention_secs {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct CorrelationManager {
    config: CorrelationConfig,
    users: RwLock<HashMap<i64, Arc<Mutex<UserRiskState>>>>,
    /// (symbol_a, symbol_b, newest candle t) -> Pearson rho. Pairs are
    /// stored with the symbols in sorted order.
    corr_cache: Mutex<HashMap<(String, String, i64), f64>>,
}

impl CorrelationManager {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            users: RwLock::new(HashMap::new()),
            corr_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn user_state(&self, user_id: i64) -> Arc<Mutex<UserRiskState>> {
        if let Some(state) = self.users.read().await.get(&user_id) {
            return state.clone();
        }
        self.users
            .write()
            .await
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(UserRiskState::default())))
            .clone()
    }

    /// The gate 11 decision for a fresh candidate.
    pub async fn check(
        &self,
        user_id: i64,
        symbol: &str,
        side: Side,
        store: &CandleStore,
        interval: Interval,
        now: i64,
    ) -> RiskDecision {
        let state = self.user_state(user_id).await;
        let mut state = state.lock().await;

        if state.paused {
            return RiskDecision::Block(BlockReason::UserPaused);
        }

        state.trim_history(now, self.config.history_hours as i64 * 3600);

        // Cooldown on same (symbol, side).
        let cooldown_secs = self.config.cooldown_min as i64 * 60;
        let in_cooldown = state
            .history
            .iter()
            .any(|(s, sd, t)| s == symbol && *sd == side && now - t < cooldown_secs);
        if in_cooldown {
            return RiskDecision::Block(BlockReason::CooldownActive);
        }

        // Group quota.
        let group = AssetGroup::classify(symbol);
        let held_in_group = state.open.iter().filter(|p| p.group == group).count();
        let quota = self.config.group_quotas.get(&group).copied().unwrap_or(usize::MAX);
        if held_in_group >= quota {
            return RiskDecision::Block(BlockReason::GroupQuotaExceeded);
        }

        // Pairwise correlation against every held symbol.
        let mut max_abs_rho: f64 = 0.0;
        for held in &state.open {
            if held.symbol == symbol {
                // Same symbol: treat an existing same-side position as
                // full concentration, an opposite one as a hedge conflict.
                return if held.side == side {
                    RiskDecision::Block(BlockReason::Concentration)
                } else {
                    RiskDecision::Block(BlockReason::HedgeContradiction)
                };
            }
            let rho = match self.pair_correlation(symbol, &held.symbol, store, interval).await {
                Some(rho) => rho,
                None => {
                    debug!(
                        "No correlation data for ({}, {}); skipping pair",
                        symbol, held.symbol
                    );
                    continue;
                }
            };
            let abs = rho.abs();
            if abs >= self.config.corr_block_threshold {
                return if held.side == side {
                    RiskDecision::Block(BlockReason::Concentration)
                } else {
                    RiskDecision::Block(BlockReason::HedgeContradiction)
                };
            }
            max_abs_rho = max_abs_rho.max(abs);
        }

        if max_abs_rho >= self.config.corr_penalty_floor {
            let band = self.config.corr_block_threshold - self.config.corr_penalty_floor;
            let penalty = 1.0 - (max_abs_rho - self.config.corr_penalty_floor) / band * 0.5;
            return RiskDecision::AllowWithPenalty(penalty.clamp(0.5, 1.0));
        }

        RiskDecision::Allow
    }

    async fn pair_correlation(
        &self,
        a: &str,
        b: &str,
        store: &CandleStore,
        interval: Interval,
    ) -> Option<f64> {
        let window = self.config.corr_window;
        // Key on the newest candle so the cache expires with the data.
        let newest_a = store.snapshot(a, interval, 1).ok()?.last()?.timestamp;
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let key = (lo.to_string(), hi.to_string(), newest_a);

        if let Some(&rho) = self.corr_cache.lock().await.get(&key) {
            return Some(rho);
        }

        let candles_a = store.snapshot(a, interval, window + 1).ok()?;
        let candles_b = store.snapshot(b, interval, window + 1).ok()?;
        let returns_a = indicators::log_returns(&indicators::closes(&candles_a));
        let returns_b = indicators::log_returns(&indicators::closes(&candles_b));
        let rho = indicators::pearson(&returns_a, &returns_b)?;

        let mut cache = self.corr_cache.lock().await;
        // Drop entries from older candles; a tick only needs the newest.
        cache.retain(|(_, _, t), _| *t >= newest_a);
        cache.insert(key, rho);
        Some(rho)
    }

    pub async fn record_signal(&self, user_id: i64, symbol: &str, side: Side, t: i64) {
        let state = self.user_state(user_id).await;
        let mut state = state.lock().await;
        state.history.push_back((symbol.to_string(), side, t));
        state.trim_history(t, self.config.history_hours as i64 * 3600);
    }

    pub async fn record_open(&self, user_id: i64, position: OpenPositionRef) {
        let state = self.user_state(user_id).await;
        state.lock().await.open.push(position);
    }

    pub async fn record_close(&self, user_id: i64, symbol: &str, side: Side) {
        let state = self.user_state(user_id).await;
        let mut state = state.lock().await;
        let before = state.open.len();
        state.open.retain(|p| !(p.symbol == symbol && p.side == side));
        if state.open.len() == before {
            warn!(
                "record_close for unknown position: user={} {} {}",
                user_id, symbol, side
            );
        }
    }

    pub async fn pause_user(&self, user_id: i64) {
        let state = self.user_state(user_id).await;
        state.lock().await.paused = true;
    }

    pub async fn resume_user(&self, user_id: i64) {
        let state = self.user_state(user_id).await;
        state.lock().await.paused = false;
    }

    pub async fn snapshot(&self, user_id: i64) -> RiskStatus {
        let state = self.user_state(user_id).await;
        let state = state.lock().await;
        let mut by_group: HashMap<String, usize> = HashMap::new();
        for p in &state.open {
            *by_group.entry(p.group.to_string()).or_default() += 1;
        }
        RiskStatus {
            user_id,
            paused: state.paused,
            open_positions: state.open.clone(),
            positions_by_group: by_group,
            signals_last_24h: state.history.len(),
        }
    }
}

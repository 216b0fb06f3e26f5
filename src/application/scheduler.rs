//! Scheduler / orchestrator: owns the tick loop.
//!
//! Per tick: refresh candles through the exchange port, compute one regime
//! snapshot, pin one parameter snapshot, fan the symbols out to a bounded
//! worker pool under a per-symbol deadline, and collect the filter traces.
//! The lifecycle ticker runs on its own cadence in a separate task.
//! Exchange flood control pauses fetching for the server-stated backoff.

use crate::application::filters::{FilterPipeline, FilterTrace, GateContext};
use crate::application::lifecycle::LifecycleManager;
use crate::application::market_data::{CandleStore, IndicatorSet, RegimeDetector};
use crate::application::signal::SignalEmitter;
use crate::application::strategies::{
    CompositeEngine, DetectionContext, PatternDetector, select_candidate,
};
use crate::config::Config;
use crate::domain::errors::ExchangeError;
use crate::domain::parameters::ParamStore;
use crate::domain::ports::{ExchangePort, ScoringModelPort};
use crate::domain::regime::RegimeSnapshot;
use crate::domain::types::{AssetGroup, Interval, SignalCandidate};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, watch};
use tracing::{debug, info, warn};

const BTC_SYMBOL: &str = "BTCUSDT";

/// Ring of recent per-tick filter traces served through the control port.
pub struct TraceStore {
    retention: usize,
    inner: RwLock<VecDeque<(u64, Vec<FilterTrace>)>>,
}

impl TraceStore {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            inner: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, tick_id: u64, traces: Vec<FilterTrace>) {
        let mut inner = self.inner.write().await;
        if inner.len() == self.retention {
            inner.pop_front();
        }
        inner.push_back((tick_id, traces));
    }

    pub async fn get(&self, tick_id: u64) -> Option<Vec<FilterTrace>> {
        let inner = self.inner.read().await;
        inner
            .iter()
            .find(|(id, _)| *id == tick_id)
            .map(|(_, traces)| traces.clone())
    }

    pub async fn latest(&self) -> Option<(u64, Vec<FilterTrace>)> {
        self.inner.read().await.back().cloned()
    }
}

/// Everything the tick path needs, wired once by the engine builder.
pub struct SchedulerDeps {
    pub config: Config,
    pub store: Arc<CandleStore>,
    pub exchange: Arc<dyn ExchangePort>,
    pub regime_detector: Arc<RegimeDetector>,
    pub detectors: Arc<Vec<Box<dyn PatternDetector>>>,
    pub composite: CompositeEngine,
    pub pipeline: Arc<FilterPipeline>,
    pub emitter: Arc<SignalEmitter>,
    pub lifecycle: Arc<LifecycleManager>,
    pub params: Arc<ParamStore>,
    /// Optional external model refining the heuristic raw score.
    pub scoring_model: Arc<dyn ScoringModelPort>,
    pub metrics: Arc<crate::infrastructure::observability::Metrics>,
    pub traces: Arc<TraceStore>,
    /// Latest regime snapshot, shared with the lifecycle ticker.
    pub current_regime: Arc<RwLock<Option<RegimeSnapshot>>>,
}

pub struct Scheduler {
    deps: Arc<SchedulerDeps>,
    tick_counter: AtomicU64,
    /// Unix seconds until which fetching is paused (exchange flood control).
    fetch_backoff_until: AtomicI64,
}

impl Scheduler {
    pub fn new(deps: Arc<SchedulerDeps>) -> Self {
        Self {
            deps,
            tick_counter: AtomicU64::new(0),
            fetch_backoff_until: AtomicI64::new(0),
        }
    }

    /// The main tick loop. Stops accepting new ticks on shutdown; the
    /// in-flight tick finishes (workers are bounded by the tick deadline).
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.deps.config.scheduler.tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler stopping: shutdown signal");
                        return;
                    }
                }
            }
        }
    }

    /// Separate cadence: drive the lifecycle manager over open positions.
    pub async fn run_lifecycle_ticker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.deps.config.lifecycle.tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.lifecycle_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn lifecycle_cycle(&self) {
        let Some(regime) = *self.deps.current_regime.read().await else {
            debug!("Lifecycle cycle skipped: no regime snapshot yet");
            return;
        };
        let quotes = match self.deps.exchange.fetch_tickers().await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!("Lifecycle cycle: ticker fetch failed: {}", e);
                return;
            }
        };
        let prices: HashMap<String, Decimal> = quotes
            .into_iter()
            .map(|(symbol, quote)| (symbol, quote.price))
            .collect();
        let now = Utc::now().timestamp();
        let transitions = self
            .deps
            .lifecycle
            .evaluate_all(
                &prices,
                &self.deps.store,
                self.deps.config.universe.interval,
                &regime,
                now,
            )
            .await;
        if transitions > 0 {
            self.deps
                .metrics
                .lifecycle_events_total
                .with_label_values(&["transition"])
                .inc_by(transitions as f64);
        }
        self.deps
            .metrics
            .open_positions
            .set(self.deps.lifecycle.open_positions(None).await.len() as i64);
    }

    /// One engine tick, excluding the lifecycle path.
    pub async fn run_tick(&self) {
        let tick_id = self.tick_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now().timestamp();

        if now < self.fetch_backoff_until.load(Ordering::SeqCst) {
            info!("Tick {} skipped: exchange backoff in effect", tick_id);
            return;
        }

        self.refresh_candles(now).await;

        // One regime snapshot for the entire tick.
        let regime = {
            let interval = self.deps.config.universe.interval;
            let htf = self.deps.config.universe.htf_interval;
            let btc_1h = self.deps.store.snapshot_all_at(BTC_SYMBOL, interval, now);
            let btc_4h = self
                .deps
                .store
                .snapshot_all_at(BTC_SYMBOL, htf, now)
                .unwrap_or_default();
            match btc_1h.and_then(|c1h| self.deps.regime_detector.detect(&c1h, &btc_4h)) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Tick {} skipped: regime unavailable ({})", tick_id, e);
                    return;
                }
            }
        };
        *self.deps.current_regime.write().await = Some(regime);

        // One parameter snapshot for the entire tick.
        let params = self.deps.params.current().await;

        let pool_size = self.deps.config.scheduler.effective_pool_size();
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let deadline = Duration::from_secs(
            self.deps.config.scheduler.tick_deadline_mult
                * self.deps.config.universe.interval.secs().max(1) as u64,
        );

        let mut joins = Vec::new();
        for symbol in self.deps.config.universe.symbols.clone() {
            let deps = self.deps.clone();
            let params = params.clone();
            let semaphore = semaphore.clone();
            joins.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Vec::new(),
                };
                match tokio::time::timeout(
                    deadline,
                    process_symbol(&deps, &symbol, &regime, &params, now, tick_id),
                )
                .await
                {
                    Ok(traces) => traces,
                    Err(_) => {
                        warn!("Symbol {} cancelled: tick deadline exceeded", symbol);
                        deps.metrics
                            .symbols_skipped_total
                            .with_label_values(&["timeout"])
                            .inc();
                        Vec::new()
                    }
                }
            }));
        }

        let mut tick_traces = Vec::new();
        for join in joins {
            match join.await {
                Ok(traces) => tick_traces.extend(traces),
                Err(e) => warn!("Symbol worker panicked: {}", e),
            }
        }

        for trace in &tick_traces {
            if let Some(reason) = trace.blocked {
                let stage = trace
                    .entries
                    .last()
                    .map(|e| e.stage)
                    .unwrap_or("unknown");
                debug!(
                    "Tick {} {} user {} blocked at {}: {}",
                    tick_id, trace.symbol, trace.user_id, stage, reason
                );
                self.deps
                    .metrics
                    .gate_blocks_total
                    .with_label_values(&[stage])
                    .inc();
            }
        }

        self.deps.traces.push(tick_id, tick_traces).await;
        self.deps.metrics.ticks_total.inc();
    }

    /// Pulls fresh candles for every symbol plus the BTC higher timeframe.
    /// A rate-limit reply pauses all fetching for the stated backoff.
    async fn refresh_candles(&self, now: i64) {
        let interval = self.deps.config.universe.interval;
        let htf = self.deps.config.universe.htf_interval;
        let limit = self.deps.config.universe.fetch_limit;

        let mut work: Vec<(String, Interval)> = Vec::new();
        for symbol in &self.deps.config.universe.symbols {
            work.push((symbol.clone(), interval));
            work.push((symbol.clone(), htf));
        }
        if !self.deps.config.universe.symbols.iter().any(|s| s == BTC_SYMBOL) {
            work.push((BTC_SYMBOL.to_string(), interval));
            work.push((BTC_SYMBOL.to_string(), htf));
        }

        for (symbol, fetch_interval) in work {
            match self
                .deps
                .exchange
                .fetch_candles(&symbol, fetch_interval, limit)
                .await
            {
                Ok(candles) => {
                    for candle in candles {
                        // Gap errors restart the series; nothing to do here.
                        let _ = self.deps.store.append(fetch_interval, candle);
                    }
                }
                Err(ExchangeError::RateLimited { retry_after_secs }) => {
                    warn!(
                        "Exchange flood control: pausing fetches for {}s",
                        retry_after_secs
                    );
                    self.fetch_backoff_until
                        .store(now + retry_after_secs as i64, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    debug!("Fetch failed for {} {}: {}", symbol, fetch_interval, e);
                    self.deps
                        .metrics
                        .symbols_skipped_total
                        .with_label_values(&["fetch_error"])
                        .inc();
                }
            }
        }
    }
}

/// The per-symbol tick work: snapshot, indicators, detection, composite,
/// then the gate pipeline and emission per subscribed user. Data errors
/// skip the symbol; they never abort the tick.
async fn process_symbol(
    deps: &SchedulerDeps,
    symbol: &str,
    regime: &RegimeSnapshot,
    params: &crate::domain::parameters::ParameterSnapshot,
    now: i64,
    tick_id: u64,
) -> Vec<FilterTrace> {
    let interval = deps.config.universe.interval;

    let candles = match deps.store.snapshot_all_at(symbol, interval, now) {
        Ok(candles) => candles,
        Err(e) => {
            debug!("Skipping {}: {}", symbol, e);
            deps.metrics
                .symbols_skipped_total
                .with_label_values(&["data"])
                .inc();
            return Vec::new();
        }
    };

    let ind = match IndicatorSet::compute(&candles, interval) {
        Ok(ind) => ind,
        Err(e) => {
            debug!("Skipping {}: {}", symbol, e);
            deps.metrics
                .symbols_skipped_total
                .with_label_values(&["data"])
                .inc();
            return Vec::new();
        }
    };

    let current_price = ind.price;
    let detection_ctx = DetectionContext {
        symbol,
        candles: &candles,
        ind: &ind,
        current_price,
    };

    let Some(pattern) = select_candidate(&deps.detectors, &detection_ctx, &deps.config.universe)
    else {
        return Vec::new();
    };

    let group = AssetGroup::classify(symbol);
    let weights = params.weights_for(regime.regime, group);
    let composite = match deps
        .composite
        .evaluate(&detection_ctx, pattern.side, &weights)
    {
        Ok(composite) => composite,
        Err(e) => {
            debug!("Skipping {}: {}", symbol, e);
            return Vec::new();
        }
    };

    let candidate = quality_scoring::score_candidate(
        symbol,
        &pattern,
        &composite,
        regime,
        params,
        &candles,
        &ind,
        deps.scoring_model.as_ref(),
    );

    let htf_candles = deps
        .store
        .snapshot_all_at(symbol, deps.config.universe.htf_interval, now)
        .unwrap_or_default();

    let mut traces = Vec::new();
    for &user_id in &deps.config.subscribed_users {
        let ctx = GateContext {
            user_id,
            candidate: &candidate,
            candles: &candles,
            ind: &ind,
            htf_candles: &htf_candles,
            regime,
            params,
            scoring: &deps.config.scoring,
            interval,
            now,
        };
        let (outcome, trace) = deps.pipeline.run(tick_id, &ctx).await;
        traces.push(trace);

        if let crate::application::filters::PipelineOutcome::Passed { penalty } = outcome {
            match deps
                .emitter
                .emit(user_id, &candidate, regime, penalty, now)
                .await
            {
                Ok(Some(_)) => deps.metrics.signals_emitted_total.inc(),
                Ok(None) => {}
                Err(e) => warn!("Emit failed for {} user {}: {:#}", symbol, user_id, e),
            }
        }
    }
    traces
}

/// Builds the final candidate from the detector hit and composite result.
pub mod quality_scoring {
    use super::*;
    use crate::application::filters::quality_score;
    use crate::application::strategies::{CompositeScore, PatternSignal};
    use crate::domain::parameters::ParameterSnapshot;
    use crate::domain::types::Candle;
    use rust_decimal::prelude::ToPrimitive;

    #[allow(clippy::too_many_arguments)]
    pub fn score_candidate(
        symbol: &str,
        pattern: &PatternSignal,
        composite: &CompositeScore,
        regime: &RegimeSnapshot,
        params: &ParameterSnapshot,
        candles: &[Candle],
        ind: &IndicatorSet,
        model: &dyn ScoringModelPort,
    ) -> SignalCandidate {
        let pattern_weight = params.pattern_weight(regime.regime, pattern.pattern);
        let heuristic = pattern.raw_score * pattern_weight + composite.bonus;
        // The model sees the normalized heuristic plus the composite pair;
        // the passthrough default hands the heuristic straight back.
        let raw_score = model.predict(&[
            heuristic / 100.0,
            composite.score,
            composite.confidence,
        ]) * 100.0;
        let quality = quality_score(
            pattern.confidence,
            pattern.side,
            pattern.entry.to_f64().unwrap_or(0.0),
            candles,
            ind,
        );
        SignalCandidate {
            symbol: symbol.to_string(),
            side: pattern.side,
            entry: pattern.entry,
            pattern: pattern.pattern,
            raw_score,
            regime_at_gen: regime.regime,
            composite_score: composite.score,
            composite_confidence: composite.confidence,
            quality_score: quality,
            pattern_confidence: pattern.confidence,
            atr: ind.atr,
            volatility_pct: ind.realized_vol_pct,
            candle_t: candles.last().map(|c| c.timestamp).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::filters::{BlockReason, TraceEntry};

    fn trace(tick_id: u64, symbol: &str) -> FilterTrace {
        FilterTrace {
            tick_id,
            user_id: 1,
            symbol: symbol.to_string(),
            entries: vec![TraceEntry {
                stage: "validation",
                passed: false,
                reason: Some(BlockReason::StaleData),
                metrics: serde_json::json!({}),
            }],
            blocked: Some(BlockReason::StaleData),
        }
    }

    #[tokio::test]
    async fn test_trace_store_retention() {
        let store = TraceStore::new(2);
        store.push(1, vec![trace(1, "BTCUSDT")]).await;
        store.push(2, vec![trace(2, "ETHUSDT")]).await;
        store.push(3, vec![trace(3, "SOLUSDT")]).await;

        assert!(store.get(1).await.is_none(), "oldest tick evicted");
        assert!(store.get(2).await.is_some());
        let (latest_id, latest) = store.latest().await.unwrap();
        assert_eq!(latest_id, 3);
        assert_eq!(latest[0].symbol, "SOLUSDT");
    }
}

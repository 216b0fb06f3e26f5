//! End-to-end tick flow: scripted market data in, persisted signal and
//! notification out, with the scheduler driving the real pipeline.

mod common;

use common::{flat_then_jump, lenient_config};
use signalforge::application::filters::{DuplicateGuard, FilterPipeline};
use signalforge::application::lifecycle::{LifecycleManager, OutcomeRecorder};
use signalforge::application::market_data::{CandleStore, RegimeDetector, RegimeThresholds};
use signalforge::application::risk::{CorrelationManager, PositionSizer};
use signalforge::application::scheduler::{Scheduler, SchedulerDeps, TraceStore};
use signalforge::application::signal::{NotificationDispatcher, SignalEmitter};
use signalforge::application::strategies::{
    CompositeEngine, EmaCrossDetector, PatternDetector,
};
use signalforge::config::Config;
use signalforge::domain::parameters::{ParamStore, ParameterSnapshot};
use signalforge::domain::types::{Interval, Side};
use signalforge::infrastructure::observability::Metrics;
use signalforge::infrastructure::{InMemoryPersistence, MockExchange, MockNotifier};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    scheduler: Scheduler,
    persistence: Arc<InMemoryPersistence>,
    notifier: Arc<MockNotifier>,
    metrics: Arc<Metrics>,
    traces: Arc<TraceStore>,
}

async fn build_harness(config: Config, exchange: Arc<MockExchange>) -> Harness {
    let persistence = Arc::new(InMemoryPersistence::new());
    let notifier = Arc::new(MockNotifier::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let store = Arc::new(CandleStore::new(config.universe.candle_capacity));
    let correlation = Arc::new(CorrelationManager::new(config.correlation.clone()));
    let duplicate_guard = Arc::new(DuplicateGuard::new());
    let traces = Arc::new(TraceStore::new(8));

    let dispatcher = NotificationDispatcher::start(
        notifier.clone(),
        persistence.clone(),
        config.notification.clone(),
        metrics.clone(),
    );
    let emitter = Arc::new(SignalEmitter::new(
        persistence.clone(),
        dispatcher.clone(),
        duplicate_guard.clone(),
        correlation.clone(),
        PositionSizer::new(config.sizing.clone()),
        config.lifecycle.clone(),
        config.scoring.clone(),
    ));
    let outcome = Arc::new(OutcomeRecorder::new(persistence.clone()));
    let lifecycle = Arc::new(LifecycleManager::new(
        config.lifecycle.clone(),
        persistence.clone(),
        dispatcher,
        outcome,
        correlation.clone(),
    ));
    let pipeline = Arc::new(FilterPipeline::standard(
        correlation,
        store.clone(),
        persistence.clone(),
        duplicate_guard,
    ));

    let params = Arc::new(ParamStore::new(ParameterSnapshot::baseline(
        config.scoring.threshold_soft,
        config.scoring.threshold_strict,
        config.scoring.quality_min,
        config.scoring.min_composite_confidence,
    )));

    // A flat tape ending in one green bar drives RSI to the ceiling, so
    // the harness widens the detector's exhaustion bounds: the scenario
    // exercises the pipeline, not the detector's overbought veto.
    let detectors: Vec<Box<dyn PatternDetector>> = vec![Box::new(EmaCrossDetector {
        rsi_overbought: 101.0,
        rsi_oversold: -1.0,
    })];

    let deps = Arc::new(SchedulerDeps {
        config,
        store,
        exchange,
        regime_detector: Arc::new(RegimeDetector::new(RegimeThresholds::default())),
        detectors: Arc::new(detectors),
        composite: CompositeEngine,
        pipeline,
        emitter,
        lifecycle,
        params,
        scoring_model: Arc::new(signalforge::domain::ports::PassthroughModel),
        metrics: metrics.clone(),
        traces: traces.clone(),
        current_regime: Arc::new(tokio::sync::RwLock::new(None)),
    });

    Harness {
        scheduler: Scheduler::new(deps),
        persistence,
        notifier,
        metrics,
        traces,
    }
}

async fn wait_for_notification(notifier: &MockNotifier, count: usize) {
    for _ in 0..100 {
        if notifier.sent_count().await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_tick_emits_signal_and_notifies() {
    let now = chrono::Utc::now().timestamp();
    let config = lenient_config(vec!["ETHUSDT"]);

    let exchange = Arc::new(MockExchange::new());
    // Flat then a jump on the final bar: the EMA-cross detector fires on
    // the newest candle and the whole gate chain has room to pass.
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("ETHUSDT", 120, 2500.0, 2575.0, Interval::H1, now),
        )
        .await;
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("BTCUSDT", 120, 50_000.0, 50_500.0, Interval::H1, now),
        )
        .await;

    let harness = build_harness(config, exchange).await;
    harness.scheduler.run_tick().await;

    assert_eq!(harness.persistence.signal_count().await, 1, "one signal persisted");
    wait_for_notification(&harness.notifier, 1).await;
    let sent = harness.notifier.sent().await;
    assert_eq!(sent.len(), 1, "one notification delivered");

    match &sent[0] {
        signalforge::infrastructure::mock::SentMessage::New { user_id, payload } => {
            assert_eq!(*user_id, 1);
            assert_eq!(payload.symbol, "ETHUSDT");
            assert_eq!(payload.side, Side::Long);
            assert!(payload.sl < payload.entry);
            assert!(payload.entry < payload.tp1);
            assert!(payload.tp1 <= payload.tp2);
        }
        other => panic!("expected a new-signal message, got {:?}", other),
    }

    // The passing run leaves a full 12-stage trace.
    let (_, traces) = harness.traces.latest().await.unwrap();
    let passing = traces.iter().find(|t| t.blocked.is_none()).expect("pass trace");
    assert_eq!(passing.entries.len(), 12);

    assert_eq!(harness.metrics.ticks_total.get(), 1);
}

#[tokio::test]
async fn test_second_tick_same_candle_is_duplicate() {
    let now = chrono::Utc::now().timestamp();
    let config = lenient_config(vec!["ETHUSDT"]);

    let exchange = Arc::new(MockExchange::new());
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("ETHUSDT", 120, 2500.0, 2575.0, Interval::H1, now),
        )
        .await;
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("BTCUSDT", 120, 50_000.0, 50_500.0, Interval::H1, now),
        )
        .await;

    let harness = build_harness(config, exchange).await;
    harness.scheduler.run_tick().await;
    wait_for_notification(&harness.notifier, 1).await;

    // Same market data again: the duplicate gate ends the run, nothing
    // new is persisted or delivered.
    harness.scheduler.run_tick().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.persistence.signal_count().await, 1);
    assert_eq!(harness.notifier.sent_count().await, 1);

    let (_, traces) = harness.traces.latest().await.unwrap();
    let blocked = traces.iter().find(|t| t.blocked.is_some()).expect("blocked trace");
    assert_eq!(
        blocked.blocked,
        Some(signalforge::application::filters::BlockReason::DuplicateSignal)
    );
}

#[tokio::test]
async fn test_rate_limited_fetch_pauses_tick() {
    let now = chrono::Utc::now().timestamp();
    let config = lenient_config(vec!["ETHUSDT"]);

    let exchange = Arc::new(MockExchange::new());
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("ETHUSDT", 120, 2500.0, 2575.0, Interval::H1, now),
        )
        .await;
    exchange
        .seed_candles(
            Interval::H1,
            flat_then_jump("BTCUSDT", 120, 50_000.0, 50_500.0, Interval::H1, now),
        )
        .await;
    exchange.script_rate_limits(vec![3600]).await;

    let harness = build_harness(config, exchange).await;
    // First tick hits flood control before any candle lands; the backoff
    // then suppresses the immediate next tick entirely.
    harness.scheduler.run_tick().await;
    harness.scheduler.run_tick().await;

    assert_eq!(harness.persistence.signal_count().await, 0);
    assert_eq!(harness.notifier.sent_count().await, 0);
}

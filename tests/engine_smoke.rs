//! Engine assembly smoke tests: build order, control surface wiring,
//! graceful shutdown.

mod common;

use common::{flat_then_jump, lenient_config};
use signalforge::application::control::ControlPort;
use signalforge::application::system::Engine;
use signalforge::domain::ports::{ExchangePort, NotificationPort, PersistencePort};
use signalforge::domain::types::Interval;
use signalforge::infrastructure::{InMemoryPersistence, MockExchange, MockNotifier};
use std::sync::Arc;

async fn seeded_exchange(now: i64) -> Arc<MockExchange> {
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
    exchange
}

#[tokio::test]
async fn test_build_start_shutdown() {
    let now = chrono::Utc::now().timestamp();
    let exchange: Arc<dyn ExchangePort> = seeded_exchange(now).await;
    let notifier: Arc<dyn NotificationPort> = Arc::new(MockNotifier::new());
    let persistence: Arc<dyn PersistencePort> = Arc::new(InMemoryPersistence::new());

    let engine = Engine::build(lenient_config(vec!["ETHUSDT"]), exchange, notifier, persistence)
        .await
        .unwrap();
    let handle = engine.start();
    handle.shutdown().await;
}

#[tokio::test]
async fn test_control_pause_resume_and_status() {
    let now = chrono::Utc::now().timestamp();
    let exchange: Arc<dyn ExchangePort> = seeded_exchange(now).await;
    let notifier: Arc<dyn NotificationPort> = Arc::new(MockNotifier::new());
    let persistence: Arc<dyn PersistencePort> = Arc::new(InMemoryPersistence::new());

    let engine = Engine::build(lenient_config(vec!["ETHUSDT"]), exchange, notifier, persistence)
        .await
        .unwrap();
    let control = engine.control();

    control.pause_user(1).await.unwrap();
    let status = control.get_risk_status(1).await;
    assert!(status.paused);

    control.resume_user(1).await.unwrap();
    let status = control.get_risk_status(1).await;
    assert!(!status.paused);
    assert!(status.open_positions.is_empty());

    // No ticks have run: no traces to serve.
    assert!(control.get_filter_trace(1).await.is_none());

    // Nothing open: force close is a zero-count no-op.
    assert_eq!(control.force_close_all(1).await.unwrap(), 0);

    let handle = engine.start();
    handle.shutdown().await;
}

#[tokio::test]
async fn test_build_loads_persisted_snapshot() {
    let now = chrono::Utc::now().timestamp();
    let exchange: Arc<dyn ExchangePort> = seeded_exchange(now).await;
    let notifier: Arc<dyn NotificationPort> = Arc::new(MockNotifier::new());
    let persistence = Arc::new(InMemoryPersistence::new());

    // A previous run left a tuned snapshot behind.
    let mut snapshot = signalforge::domain::parameters::ParameterSnapshot::default();
    snapshot.version = 7;
    persistence.publish_parameter_snapshot(&snapshot).await.unwrap();

    let engine = Engine::build(
        lenient_config(vec!["ETHUSDT"]),
        exchange,
        notifier,
        persistence.clone(),
    )
    .await
    .unwrap();

    // Building must not publish anything new on top.
    let stored = persistence.load_parameter_snapshot().await.unwrap().unwrap();
    assert_eq!(stored.version, 7);

    let handle = engine.start();
    handle.shutdown().await;
}

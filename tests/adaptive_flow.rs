//! The learning loop across components: recorded outcomes feed the
//! controller, the published snapshot changes the live pipeline
//! thresholds without disturbing a pinned tick.

use signalforge::application::adaptive::AdaptiveController;
use signalforge::domain::parameters::{ParamStore, ParameterSnapshot};
use signalforge::domain::ports::PersistencePort;
use signalforge::domain::regime::MarketRegime;
use signalforge::domain::trade_result::TradeResult;
use signalforge::domain::types::{PatternType, Side};
use signalforge::infrastructure::InMemoryPersistence;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

fn trade(regime: MarketRegime, pnl_pct: f64, closed_at: i64) -> TradeResult {
    TradeResult {
        signal_id: Uuid::new_v4(),
        user_id: 1,
        symbol: "ETHUSDT".to_string(),
        pattern: PatternType::EmaCross,
        side: Side::Long,
        entry_price: dec!(2500),
        exit_price: dec!(2550),
        pnl_pct,
        is_winner: pnl_pct > 0.0,
        duration_hours: 4.0,
        ai_score: 40.0,
        market_regime: regime,
        composite_score: 0.7,
        composite_confidence: 0.6,
        volume_usd: 1e7,
        volatility_pct: 2.0,
        closed_at,
    }
}

#[tokio::test]
async fn test_run_once_publishes_and_swaps_snapshot() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let params = Arc::new(ParamStore::new(ParameterSnapshot::default()));
    let controller = AdaptiveController::new(persistence.clone(), params.clone(), 14);

    let now = 1_700_000_000;
    // A losing BULL_TREND book inside the window.
    for i in 0..15 {
        let pnl = if i < 4 { 2.0 } else { -1.5 };
        persistence
            .save_trade_result(&trade(MarketRegime::BullTrend, pnl, now - i * 3600))
            .await
            .unwrap();
    }

    // A reader pins the current snapshot mid-"tick".
    let pinned = params.current().await;
    assert_eq!(pinned.version, 0);

    let published = controller.run_once(now).await.unwrap();
    assert_eq!(published.version, 1);
    let mult = published.threshold_mult[&MarketRegime::BullTrend];
    assert!(mult > 1.0, "losing regime tightens, got {}", mult);

    // The pinned snapshot is untouched; fresh readers see v1.
    assert_eq!(pinned.version, 0);
    assert_eq!(pinned.threshold_mult[&MarketRegime::BullTrend], 1.0);
    assert_eq!(params.current().await.version, 1);

    // And the snapshot survives a restart via persistence.
    let reloaded = persistence.load_parameter_snapshot().await.unwrap().unwrap();
    assert_eq!(reloaded.version, 1);
}

#[tokio::test]
async fn test_results_outside_window_ignored() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let params = Arc::new(ParamStore::new(ParameterSnapshot::default()));
    let controller = AdaptiveController::new(persistence.clone(), params.clone(), 7);

    let now = 1_700_000_000;
    // All losses, but everything sits beyond the 7-day window.
    for i in 0..15 {
        persistence
            .save_trade_result(&trade(
                MarketRegime::BearTrend,
                -2.0,
                now - 10 * 86_400 - i * 3600,
            ))
            .await
            .unwrap();
    }

    let published = controller.run_once(now).await.unwrap();
    assert_eq!(
        published.threshold_mult[&MarketRegime::BearTrend], 1.0,
        "stale history must not move thresholds"
    );
}

#[tokio::test]
async fn test_consecutive_runs_compound_within_bounds() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let params = Arc::new(ParamStore::new(ParameterSnapshot::default()));
    let controller = AdaptiveController::new(persistence.clone(), params.clone(), 14);

    let now = 1_700_000_000;
    for i in 0..20 {
        persistence
            .save_trade_result(&trade(MarketRegime::Crash, -2.0, now - i * 3600))
            .await
            .unwrap();
    }

    // Many cycles over the same losing book: the multiplier ratchets up
    // but stays bounded.
    for run in 0..30 {
        controller.run_once(now + run).await.unwrap();
    }
    let current = params.current().await;
    let mult = current.threshold_mult[&MarketRegime::Crash];
    assert!(mult > 1.0);
    assert!(mult <= 1.8, "threshold multiplier must stay bounded, got {}", mult);
    assert_eq!(current.version, 30);
}

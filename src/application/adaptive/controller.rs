//! Adaptive parameter controller: the learning loop's write side.
//!
//! Once a day it reads the recent trade results and re-derives per-regime
//! score thresholds, per-pattern weights and the composite-confidence
//! floor, publishing them as a fresh immutable snapshot. It never touches
//! live state; readers pick the new snapshot up at their next tick.

use crate::domain::parameters::{ParamStore, ParameterSnapshot};
use crate::domain::ports::PersistencePort;
use crate::domain::regime::MarketRegime;
use crate::domain::trade_result::TradeResult;
use anyhow::{Context, Result};
use chrono::{Datelike, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Tuning bounds. Thresholds tighten at most this far from baseline and
/// pattern weights stay within a factor of two either way.
const THRESHOLD_MULT_MIN: f64 = 0.7;
const THRESHOLD_MULT_MAX: f64 = 1.8;
const PATTERN_WEIGHT_MIN: f64 = 0.5;
const PATTERN_WEIGHT_MAX: f64 = 2.0;
const MIN_SAMPLES_PER_REGIME: usize = 10;
const MIN_SAMPLES_PER_BUCKET: usize = 20;
const CONFIDENCE_FLOOR_MIN: f64 = 0.2;
const CONFIDENCE_FLOOR_MAX: f64 = 0.8;

pub struct AdaptiveController {
    persistence: Arc<dyn PersistencePort>,
    params: Arc<ParamStore>,
    window_days: u64,
}

impl AdaptiveController {
    pub fn new(
        persistence: Arc<dyn PersistencePort>,
        params: Arc<ParamStore>,
        window_days: u64,
    ) -> Self {
        Self {
            persistence,
            params,
            window_days,
        }
    }

    /// One retune cycle: read history, derive, publish, swap.
    pub async fn run_once(&self, now: i64) -> Result<ParameterSnapshot> {
        let since = now - self.window_days as i64 * 86_400;
        let results = self
            .persistence
            .load_trade_results_since(since)
            .await
            .context("Failed to load trade history for retune")?;

        let previous = self.params.current().await;
        let next = retune(&previous, &results, now);

        self.persistence
            .publish_parameter_snapshot(&next)
            .await
            .context("Failed to publish parameter snapshot")?;
        self.params.publish(next.clone()).await;

        info!(
            "Published parameter snapshot v{} from {} trade results",
            next.version,
            results.len()
        );
        Ok(next)
    }

    /// Long-lived daily task. Runs at the configured UTC hour; shutdown
    /// wins any race.
    pub async fn run_daily(self: Arc<Self>, hour_utc: u32, mut shutdown: watch::Receiver<bool>) {
        loop {
            let wait = seconds_until_hour(Utc::now().timestamp(), hour_utc);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(wait)) => {
                    if let Err(e) = self.run_once(Utc::now().timestamp()).await {
                        warn!("Adaptive retune failed: {:#}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

fn seconds_until_hour(now: i64, hour_utc: u32) -> u64 {
    let now_dt = Utc.timestamp_opt(now, 0).single().unwrap_or_else(Utc::now);
    let today_run = Utc
        .with_ymd_and_hms(now_dt.year(), now_dt.month(), now_dt.day(), hour_utc, 0, 0)
        .single();
    match today_run {
        Some(run) if run.timestamp() > now => (run.timestamp() - now) as u64,
        Some(run) => (run.timestamp() + 86_400 - now) as u64,
        None => 86_400,
    }
}

/// Pure retune: previous snapshot + window of results -> next snapshot.
pub fn retune(
    previous: &ParameterSnapshot,
    results: &[TradeResult],
    now: i64,
) -> ParameterSnapshot {
    let mut next = previous.clone();
    next.version = previous.version + 1;
    next.as_of = now;

    for regime in MarketRegime::ALL {
        let in_regime: Vec<&TradeResult> = results
            .iter()
            .filter(|r| r.market_regime == regime)
            .collect();
        if in_regime.len() < MIN_SAMPLES_PER_REGIME {
            continue;
        }

        let wins = in_regime.iter().filter(|r| r.is_winner).count();
        let win_rate = wins as f64 / in_regime.len() as f64;
        let current = next.threshold_mult.get(&regime).copied().unwrap_or(1.0);
        // Losing regimes get a higher bar, winning ones a lower bar.
        let updated = if win_rate < 0.5 {
            current * 1.05
        } else if win_rate > 0.7 {
            current * 0.95
        } else {
            current
        };
        next.threshold_mult
            .insert(regime, updated.clamp(THRESHOLD_MULT_MIN, THRESHOLD_MULT_MAX));

        // Per-pattern weights from profit factor.
        let per_pattern = next.pattern_weights.entry(regime).or_default();
        for pattern in crate::domain::types::PatternType::ALL {
            let trades: Vec<&&TradeResult> = in_regime
                .iter()
                .filter(|r| r.pattern == pattern)
                .collect();
            if trades.len() < MIN_SAMPLES_PER_REGIME {
                continue;
            }
            let gross_win: f64 = trades
                .iter()
                .filter(|r| r.pnl_pct > 0.0)
                .map(|r| r.pnl_pct)
                .sum();
            let gross_loss: f64 = trades
                .iter()
                .filter(|r| r.pnl_pct < 0.0)
                .map(|r| -r.pnl_pct)
                .sum();
            let profit_factor = if gross_loss > 0.0 {
                gross_win / gross_loss
            } else if gross_win > 0.0 {
                PATTERN_WEIGHT_MAX
            } else {
                1.0
            };
            let weight =
                (0.5 + 0.5 * profit_factor).clamp(PATTERN_WEIGHT_MIN, PATTERN_WEIGHT_MAX);
            per_pattern.insert(pattern, weight);
        }
    }

    if let Some(floor) = confidence_knee(results) {
        next.min_composite_confidence = floor.clamp(CONFIDENCE_FLOOR_MIN, CONFIDENCE_FLOOR_MAX);
    }

    next
}

/// Finds the lowest confidence decile whose trades, taken cumulatively
/// from that decile up, win more than half the time. Returns `None`
/// without enough data for a clear knee.
fn confidence_knee(results: &[TradeResult]) -> Option<f64> {
    for decile in 0..10 {
        let floor = decile as f64 / 10.0;
        let above: Vec<&TradeResult> = results
            .iter()
            .filter(|r| r.composite_confidence >= floor)
            .collect();
        if above.len() < MIN_SAMPLES_PER_BUCKET {
            return None;
        }
        let wins = above.iter().filter(|r| r.is_winner).count();
        if wins as f64 / above.len() as f64 > 0.5 {
            return Some(floor);
        }
    }
    None
}

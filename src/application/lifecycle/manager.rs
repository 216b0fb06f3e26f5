//! Position lifecycle manager: the single writer for every open position.
//!
//! Driven by a periodic tick over all open positions. Per position and
//! price: stop-loss hits, partial and full take-profits, and the
//! monotonic trailing stop. Every terminal transition produces exactly
//! one trade result, and dispatch failures never roll state back.

use crate::application::lifecycle::outcome_recorder::OutcomeRecorder;
use crate::application::market_data::{CandleStore, indicators};
use crate::application::risk::{CorrelationManager, OpenPositionRef};
use crate::application::signal::dispatcher::{DispatchPayload, NotificationDispatcher};
use crate::config::LifecycleConfig;
use crate::domain::ports::{LifecycleUpdate, MessageRef, PersistencePort};
use crate::domain::position::{LifecycleEvent, Position, PositionStatus};
use crate::domain::regime::RegimeSnapshot;
use crate::domain::types::{AssetGroup, EmittedSignal, Interval, Side};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Pure transition function: evaluates one position against one price.
/// Mutates the position in place and returns the events, in order.
/// Idempotent once terminal: re-evaluating a closed position is a no-op.
pub fn evaluate_position(
    position: &mut Position,
    price: Decimal,
    atr: Decimal,
    regime: &RegimeSnapshot,
    config: &LifecycleConfig,
    now: i64,
) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    if position.is_terminal() {
        return events;
    }
    position.last_update = now;

    // Stop first: a tick that gaps through both stop and target resolves
    // to the stop.
    if position.stop_hit(price) {
        let closed = position.remaining_size;
        position.realize_leg(closed, price);
        position.remaining_size = Decimal::ZERO;
        position.status = PositionStatus::ClosedSl;
        events.push(LifecycleEvent::Closed {
            status: PositionStatus::ClosedSl,
            price,
        });
        return events;
    }

    // Partial take-profit at TP1.
    if !position.tp1_hit
        && position.remaining_size >= config.min_partial_size_usdt
        && position.reached(price, position.tp1)
    {
        let split = Decimal::from_f64(config.tp1_split_pct / 100.0).unwrap_or(Decimal::ONE);
        let closed = (position.initial_size * split).min(position.remaining_size);
        position.realize_leg(closed, price);
        position.remaining_size -= closed;
        position.tp1_hit = true;
        position.status = PositionStatus::Tp1Partial;

        let breakeven = breakeven_floor(position, config);
        let new_sl = favorable_max(position.side, position.current_sl, breakeven);
        position.current_sl = new_sl;

        events.push(LifecycleEvent::PartialTakeProfit {
            price,
            closed_size: closed,
            new_sl,
        });
    }

    // Full close at TP2 (covers the partial-TP-disabled path too).
    if position.reached(price, position.tp2) && !position.remaining_size.is_zero() {
        let closed = position.remaining_size;
        position.realize_leg(closed, price);
        position.remaining_size = Decimal::ZERO;
        position.status = PositionStatus::ClosedTp;
        events.push(LifecycleEvent::Closed {
            status: PositionStatus::ClosedTp,
            price,
        });
        return events;
    }

    // Trailing stop: arm on reaching the activation profit, then ratchet.
    let profit_pct = position.unrealized_return_pct(price).to_f64().unwrap_or(0.0);
    let newly_armed = !position.trailing_active
        && profit_pct >= config.activation_min_profit_pct;
    if newly_armed {
        position.trailing_active = true;
        position.high_water_mark = price;
    }

    if position.trailing_active {
        position.high_water_mark = favorable_max(position.side, position.high_water_mark, price);

        let candidate = trail_candidate(position.side, price, atr, regime, config);
        // Once trailing is engaged the stop never sits below breakeven.
        let floored = favorable_max(position.side, candidate, breakeven_floor(position, config));
        let advanced = match position.side {
            Side::Long => floored > position.current_sl,
            Side::Short => floored < position.current_sl,
        };

        if newly_armed {
            if advanced {
                position.current_sl = floored;
            }
            events.push(LifecycleEvent::TrailingArmed {
                stop: position.current_sl,
            });
        } else if advanced {
            events.push(LifecycleEvent::StopAdvanced {
                from: position.current_sl,
                to: floored,
            });
            position.current_sl = floored;
        }
    }

    events
}

/// Trailing distance: at least `min_trail_distance_pct` of price, usually
/// `k_trail` ATRs scaled by the regime stop multiplier, never more than
/// `max_trail_distance_pct` of price.
fn trail_candidate(
    side: Side,
    price: Decimal,
    atr: Decimal,
    regime: &RegimeSnapshot,
    config: &LifecycleConfig,
) -> Decimal {
    let pct = |p: f64| Decimal::from_f64(p / 100.0).unwrap_or(Decimal::ZERO) * price;
    let atr_dist =
        atr * Decimal::from_f64(config.k_trail * regime.multipliers.sl).unwrap_or(Decimal::ONE);
    let dist = atr_dist
        .max(pct(config.min_trail_distance_pct))
        .min(pct(config.max_trail_distance_pct));
    match side {
        Side::Long => price - dist,
        Side::Short => price + dist,
    }
}

fn breakeven_floor(position: &Position, config: &LifecycleConfig) -> Decimal {
    let offset =
        Decimal::from_f64(config.breakeven_offset_pct / 100.0).unwrap_or(Decimal::ZERO);
    position.entry * (Decimal::ONE + position.side.sign() * offset)
}

/// The more favourable of two stop levels for the given side.
fn favorable_max(side: Side, a: Decimal, b: Decimal) -> Decimal {
    match side {
        Side::Long => a.max(b),
        Side::Short => a.min(b),
    }
}

pub struct LifecycleManager {
    config: LifecycleConfig,
    positions: RwLock<HashMap<Uuid, Position>>,
    persistence: Arc<dyn PersistencePort>,
    dispatcher: Arc<NotificationDispatcher>,
    outcome: Arc<OutcomeRecorder>,
    correlation: Arc<CorrelationManager>,
}

impl LifecycleManager {
    pub fn new(
        config: LifecycleConfig,
        persistence: Arc<dyn PersistencePort>,
        dispatcher: Arc<NotificationDispatcher>,
        outcome: Arc<OutcomeRecorder>,
        correlation: Arc<CorrelationManager>,
    ) -> Self {
        Self {
            config,
            positions: RwLock::new(HashMap::new()),
            persistence,
            dispatcher,
            outcome,
            correlation,
        }
    }

    /// Opens a position from an accepted signal and registers it with the
    /// correlation manager.
    pub async fn open_from_signal(
        &self,
        signal: &EmittedSignal,
        volume_usd: f64,
        now: i64,
    ) -> Result<Position> {
        let position = Position::from_signal(signal, volume_usd, now);
        self.persistence.save_position(&position).await?;
        self.correlation
            .record_open(
                position.user_id,
                OpenPositionRef {
                    symbol: position.symbol.clone(),
                    side: position.side,
                    group: AssetGroup::classify(&position.symbol),
                    opened_at: now,
                },
            )
            .await;
        self.positions
            .write()
            .await
            .insert(position.signal_id, position.clone());
        info!(
            "Opened position {} {} {} size={}",
            position.signal_id, position.symbol, position.side, position.initial_size
        );
        Ok(position)
    }

    /// Startup rehydration from persistence.
    pub async fn rehydrate(&self, positions: Vec<Position>) {
        let mut map = self.positions.write().await;
        for position in positions {
            if position.is_terminal() {
                continue;
            }
            self.correlation
                .record_open(
                    position.user_id,
                    OpenPositionRef {
                        symbol: position.symbol.clone(),
                        side: position.side,
                        group: AssetGroup::classify(&position.symbol),
                        opened_at: position.opened_at,
                    },
                )
                .await;
            map.insert(position.signal_id, position);
        }
        info!("Rehydrated {} open positions", map.len());
    }

    /// One lifecycle cycle over every open position. ATR is recomputed
    /// from the store per symbol; symbols without a price or ATR are
    /// skipped this cycle, never closed blind.
    pub async fn evaluate_all(
        &self,
        prices: &HashMap<String, Decimal>,
        store: &CandleStore,
        interval: Interval,
        regime: &RegimeSnapshot,
        now: i64,
    ) -> usize {
        let ids: Vec<Uuid> = {
            let map = self.positions.read().await;
            map.values()
                .filter(|p| !p.is_terminal())
                .map(|p| p.signal_id)
                .collect()
        };

        let mut atr_cache: HashMap<String, Decimal> = HashMap::new();
        let mut transitions = 0usize;

        for id in ids {
            let (symbol, price) = {
                let map = self.positions.read().await;
                let Some(p) = map.get(&id) else { continue };
                let Some(price) = prices.get(&p.symbol).copied() else {
                    continue;
                };
                (p.symbol.clone(), price)
            };

            let atr = match atr_cache.get(&symbol) {
                Some(&atr) => atr,
                None => {
                    let atr = store
                        .snapshot_at(&symbol, interval, indicators::ATR_PERIOD + 1, now)
                        .ok()
                        .and_then(|candles| indicators::atr(&candles, indicators::ATR_PERIOD).ok())
                        .unwrap_or(Decimal::ZERO);
                    atr_cache.insert(symbol.clone(), atr);
                    atr
                }
            };

            let events = {
                let mut map = self.positions.write().await;
                let Some(position) = map.get_mut(&id) else { continue };
                evaluate_position(position, price, atr, regime, &self.config, now)
            };
            if events.is_empty() {
                continue;
            }
            transitions += events.len();
            self.apply_events(id, price, events, now).await;
        }
        transitions
    }

    /// Persists the mutated position, pushes user-facing updates, and on a
    /// terminal event records the outcome and frees correlation state.
    /// State has already advanced; nothing here can roll it back.
    async fn apply_events(&self, id: Uuid, price: Decimal, events: Vec<LifecycleEvent>, now: i64) {
        let position = {
            let map = self.positions.read().await;
            match map.get(&id) {
                Some(p) => p.clone(),
                None => return,
            }
        };

        if let Err(e) = self.persistence.save_position(&position).await {
            warn!("Failed to persist position {}: {:#}", id, e);
        }

        for event in &events {
            if let Some(message_ref) = &position.message_ref {
                let patch = match event {
                    LifecycleEvent::TrailingArmed { stop } => Some(LifecycleUpdate::TrailingAdvanced {
                        new_sl: *stop,
                    }),
                    LifecycleEvent::StopAdvanced { to, .. } => {
                        Some(LifecycleUpdate::TrailingAdvanced { new_sl: *to })
                    }
                    LifecycleEvent::PartialTakeProfit { price, new_sl, .. } => {
                        Some(LifecycleUpdate::Tp1Hit {
                            price: *price,
                            new_sl: *new_sl,
                        })
                    }
                    LifecycleEvent::Closed { status, price } => Some(LifecycleUpdate::Closed {
                        status: *status,
                        price: *price,
                        pnl_pct: position.realized_return_pct.to_f64().unwrap_or(0.0),
                    }),
                };
                if let Some(patch) = patch {
                    self.dispatcher.enqueue(DispatchPayload::Update {
                        user_id: position.user_id,
                        message_ref: MessageRef(message_ref.clone()),
                        patch,
                    });
                }
            }

            if let LifecycleEvent::Closed { .. } = event {
                if let Err(e) = self.outcome.record(&position, price, now).await {
                    warn!("Failed to record trade result for {}: {:#}", id, e);
                }
                self.correlation
                    .record_close(position.user_id, &position.symbol, position.side)
                    .await;
            }
        }
    }

    /// Manual close of every open position for a user, at the last known
    /// price per symbol (entry when none is known, realizing zero).
    pub async fn force_close_all(
        &self,
        user_id: i64,
        prices: &HashMap<String, Decimal>,
        now: i64,
    ) -> usize {
        let ids: Vec<Uuid> = {
            let map = self.positions.read().await;
            map.values()
                .filter(|p| p.user_id == user_id && !p.is_terminal())
                .map(|p| p.signal_id)
                .collect()
        };

        let mut closed = 0usize;
        for id in ids {
            let (price, events) = {
                let mut map = self.positions.write().await;
                let Some(position) = map.get_mut(&id) else { continue };
                let price = prices
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.entry);
                let remaining = position.remaining_size;
                position.realize_leg(remaining, price);
                position.remaining_size = Decimal::ZERO;
                position.status = PositionStatus::ClosedManual;
                position.last_update = now;
                (
                    price,
                    vec![LifecycleEvent::Closed {
                        status: PositionStatus::ClosedManual,
                        price,
                    }],
                )
            };
            self.apply_events(id, price, events, now).await;
            closed += 1;
        }
        info!("Force-closed {} positions for user {}", closed, user_id);
        closed
    }

    pub async fn open_positions(&self, user_id: Option<i64>) -> Vec<Position> {
        let map = self.positions.read().await;
        map.values()
            .filter(|p| !p.is_terminal())
            .filter(|p| user_id.is_none_or(|u| p.user_id == u))
            .cloned()
            .collect()
    }

    pub async fn position(&self, signal_id: Uuid) -> Option<Position> {
        self.positions.read().await.get(&signal_id).cloned()
    }
}

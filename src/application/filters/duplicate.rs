use crate::application::filters::{BlockReason, GateContext, GateDecision, SignalGate};
use crate::domain::types::Side;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Remembers the last emission time per (user, symbol, side) so restarts
/// of the same setup within the cooldown window stay silent.
#[derive(Default)]
pub struct DuplicateGuard {
    last_emit: RwLock<HashMap<(i64, String, Side), i64>>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_duplicate(
        &self,
        user_id: i64,
        symbol: &str,
        side: Side,
        now: i64,
        window_secs: i64,
    ) -> bool {
        let map = self.last_emit.read().expect("duplicate guard poisoned");
        map.get(&(user_id, symbol.to_string(), side))
            .is_some_and(|&t| now - t < window_secs)
    }

    /// Records an emission. Called by the emitter after persistence.
    pub fn record(&self, user_id: i64, symbol: &str, side: Side, t: i64) {
        let mut map = self.last_emit.write().expect("duplicate guard poisoned");
        map.insert((user_id, symbol.to_string(), side), t);
    }
}

/// Gate 12: no identical (symbol, side) signal for the same user within
/// the cooldown window. Defaults to one candle interval.
pub struct DuplicateSignalGate {
    guard: std::sync::Arc<DuplicateGuard>,
    /// Override window in seconds; 0 means one candle interval.
    pub window_secs: i64,
}

impl DuplicateSignalGate {
    pub fn new(guard: std::sync::Arc<DuplicateGuard>) -> Self {
        Self {
            guard,
            window_secs: 0,
        }
    }
}

#[async_trait]
impl SignalGate for DuplicateSignalGate {
    fn name(&self) -> &'static str {
        "duplicate_signal"
    }

    async fn evaluate(&self, ctx: &GateContext<'_>) -> GateDecision {
        let window = if self.window_secs > 0 {
            self.window_secs
        } else {
            ctx.interval.secs()
        };
        if self.guard.is_duplicate(
            ctx.user_id,
            &ctx.candidate.symbol,
            ctx.candidate.side,
            ctx.now,
            window,
        ) {
            return GateDecision::Block(BlockReason::DuplicateSignal);
        }
        GateDecision::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_window() {
        let guard = DuplicateGuard::new();
        guard.record(1, "ETHUSDT", Side::Long, 1000);
        assert!(guard.is_duplicate(1, "ETHUSDT", Side::Long, 1500, 3600));
        assert!(!guard.is_duplicate(1, "ETHUSDT", Side::Long, 5000, 3600));
        // Different side and different user are independent.
        assert!(!guard.is_duplicate(1, "ETHUSDT", Side::Short, 1500, 3600));
        assert!(!guard.is_duplicate(2, "ETHUSDT", Side::Long, 1500, 3600));
    }
}

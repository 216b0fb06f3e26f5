//! In-memory candle store: one bounded ring per (symbol, interval).
//!
//! The store is the single owner of candle history. Appends are serialized
//! per series by the write lock; readers receive copies and never hold the
//! lock across computation.

use crate::domain::errors::DataError;
use crate::domain::types::{Candle, Interval};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::warn;

pub struct CandleStore {
    capacity: usize,
    series: RwLock<HashMap<(String, Interval), VecDeque<Candle>>>,
}

impl CandleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Appends one candle. Candles must arrive in strictly increasing
    /// timestamp order; a same-or-older timestamp is ignored (refresh
    /// overlap), and a gap larger than one interval invalidates the
    /// segment, restarting history from the new candle.
    pub fn append(&self, interval: Interval, candle: Candle) -> Result<(), DataError> {
        let mut series = self.series.write().expect("candle store lock poisoned");
        let ring = series
            .entry((candle.symbol.clone(), interval))
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        if let Some(last) = ring.back() {
            if candle.timestamp <= last.timestamp {
                return Ok(());
            }
            if candle.timestamp - last.timestamp > interval.secs() {
                warn!(
                    "Candle gap for {} {}: {} -> {}, dropping stale segment",
                    candle.symbol, interval, last.timestamp, candle.timestamp
                );
                let at = candle.timestamp;
                let symbol = candle.symbol.clone();
                ring.clear();
                ring.push_back(candle);
                return Err(DataError::GapDetected { symbol, at });
            }
        }

        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(candle);
        Ok(())
    }

    /// Copies the newest `n` candles (oldest first). Fails with `Stale`
    /// when the newest candle is older than two intervals at `now`.
    pub fn snapshot_at(
        &self,
        symbol: &str,
        interval: Interval,
        n: usize,
        now: i64,
    ) -> Result<Vec<Candle>, DataError> {
        let series = self.series.read().expect("candle store lock poisoned");
        let ring = series
            .get(&(symbol.to_string(), interval))
            .ok_or(DataError::InsufficientData { required: n, got: 0 })?;

        let newest = ring.back().ok_or(DataError::InsufficientData { required: n, got: 0 })?;
        let age = now - newest.timestamp;
        let limit = 2 * interval.secs();
        if age > limit {
            return Err(DataError::Stale {
                symbol: symbol.to_string(),
                age_secs: age,
                limit_secs: limit,
            });
        }

        if ring.len() < n {
            return Err(DataError::InsufficientData {
                required: n,
                got: ring.len(),
            });
        }

        Ok(ring.iter().skip(ring.len() - n).cloned().collect())
    }

    pub fn snapshot(
        &self,
        symbol: &str,
        interval: Interval,
        n: usize,
    ) -> Result<Vec<Candle>, DataError> {
        self.snapshot_at(symbol, interval, n, chrono::Utc::now().timestamp())
    }

    /// Copies the whole ring (freshness-checked, oldest first).
    pub fn snapshot_all_at(
        &self,
        symbol: &str,
        interval: Interval,
        now: i64,
    ) -> Result<Vec<Candle>, DataError> {
        let available = self.len(symbol, interval);
        if available == 0 {
            return Err(DataError::InsufficientData { required: 1, got: 0 });
        }
        self.snapshot_at(symbol, interval, available, now)
    }

    /// Close of the newest candle, regardless of freshness.
    pub fn last_close(&self, symbol: &str, interval: Interval) -> Option<Decimal> {
        let series = self.series.read().expect("candle store lock poisoned");
        series
            .get(&(symbol.to_string(), interval))
            .and_then(|ring| ring.back())
            .map(|c| c.close)
    }

    pub fn len(&self, symbol: &str, interval: Interval) -> usize {
        let series = self.series.read().expect("candle store lock poisoned");
        series
            .get(&(symbol.to_string(), interval))
            .map(|ring| ring.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str, interval: Interval) -> bool {
        self.len(symbol, interval) == 0
    }
}

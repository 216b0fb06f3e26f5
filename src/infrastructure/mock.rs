//! Mock exchange and notifier for tests and the `--mock` server mode.
//! The exchange serves scripted candle series; the notifier records what
//! it was asked to deliver and can be scripted to fail.

use crate::domain::errors::{ExchangeError, NotifyError};
use crate::domain::ports::{
    ExchangePort, LifecycleUpdate, MessageRef, NotificationPort, PriceQuote, SignalNotification,
};
use crate::domain::types::{Candle, Interval};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
pub struct MockExchange {
    candles: RwLock<HashMap<(String, Interval), Vec<Candle>>>,
    rate_limit_script: Mutex<VecDeque<u64>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_candles(&self, interval: Interval, candles: Vec<Candle>) {
        if let Some(first) = candles.first() {
            self.candles
                .write()
                .await
                .insert((first.symbol.clone(), interval), candles);
        }
    }

    /// Seeds a geometric ramp: `n` candles ending at `now`, each close
    /// `step_pct` percent above the previous.
    pub async fn seed_ramp(
        &self,
        symbol: &str,
        interval: Interval,
        n: usize,
        start_price: f64,
        step_pct: f64,
        now: i64,
    ) {
        let mut price = start_price;
        let candles = (0..n)
            .map(|i| {
                price *= 1.0 + step_pct / 100.0;
                let p = Decimal::from_f64(price).unwrap_or_default();
                Candle {
                    symbol: symbol.to_string(),
                    timestamp: now - (n as i64 - 1 - i as i64) * interval.secs(),
                    open: p,
                    high: p * dec!(1.003),
                    low: p * dec!(0.997),
                    close: p,
                    volume: dec!(1500),
                }
            })
            .collect();
        self.candles
            .write()
            .await
            .insert((symbol.to_string(), interval), candles);
    }

    /// The next `fetch_candles` calls fail rate-limited with these waits.
    pub async fn script_rate_limits(&self, retry_afters: Vec<u64>) {
        let mut script = self.rate_limit_script.lock().await;
        script.extend(retry_afters);
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if let Some(retry_after_secs) = self.rate_limit_script.lock().await.pop_front() {
            return Err(ExchangeError::RateLimited { retry_after_secs });
        }
        let candles = self.candles.read().await;
        let series = candles
            .get(&(symbol.to_string(), interval))
            .ok_or_else(|| ExchangeError::SymbolUnknown {
                symbol: symbol.to_string(),
            })?;
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }

    async fn fetch_tickers(&self) -> Result<HashMap<String, PriceQuote>, ExchangeError> {
        let candles = self.candles.read().await;
        let mut quotes = HashMap::new();
        for ((symbol, _), series) in candles.iter() {
            if let Some(last) = series.last() {
                quotes.insert(
                    symbol.clone(),
                    PriceQuote {
                        symbol: symbol.clone(),
                        price: last.close,
                        timestamp: last.timestamp,
                    },
                );
            }
        }
        Ok(quotes)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, ExchangeError> {
        let candles = self.candles.read().await;
        let mut symbols: Vec<String> =
            candles.keys().map(|(symbol, _)| symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

#[derive(Debug, Clone)]
pub enum SentMessage {
    New { user_id: i64, payload: SignalNotification },
    Update { message_ref: String, patch: LifecycleUpdate },
}

#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<SentMessage>>,
    fail_script: Mutex<VecDeque<NotifyError>>,
    counter: AtomicU64,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next deliveries fail with these errors, in order.
    pub async fn script_failures(&self, failures: Vec<NotifyError>) {
        let mut script = self.fail_script.lock().await;
        script.extend(failures);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl NotificationPort for MockNotifier {
    async fn emit(
        &self,
        user_id: i64,
        payload: &SignalNotification,
    ) -> Result<MessageRef, NotifyError> {
        if let Some(err) = self.fail_script.lock().await.pop_front() {
            return Err(err);
        }
        self.sent.lock().await.push(SentMessage::New {
            user_id,
            payload: payload.clone(),
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef(format!("msg-{}", n)))
    }

    async fn update(
        &self,
        message_ref: &MessageRef,
        patch: &LifecycleUpdate,
    ) -> Result<(), NotifyError> {
        if let Some(err) = self.fail_script.lock().await.pop_front() {
            return Err(err);
        }
        self.sent.lock().await.push(SentMessage::Update {
            message_ref: message_ref.0.clone(),
            patch: patch.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_exchange_serves_tail() {
        let exchange = MockExchange::new();
        exchange
            .seed_ramp("BTCUSDT", Interval::H1, 100, 50_000.0, 0.1, 360_000)
            .await;
        let candles = exchange
            .fetch_candles("BTCUSDT", Interval::H1, 10)
            .await
            .unwrap();
        assert_eq!(candles.len(), 10);
        assert_eq!(candles.last().unwrap().timestamp, 360_000);
    }

    #[tokio::test]
    async fn test_rate_limit_script() {
        let exchange = MockExchange::new();
        exchange
            .seed_ramp("BTCUSDT", Interval::H1, 10, 50_000.0, 0.1, 36_000)
            .await;
        exchange.script_rate_limits(vec![30]).await;
        let err = exchange
            .fetch_candles("BTCUSDT", Interval::H1, 5)
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::RateLimited { retry_after_secs: 30 });
        // Next call succeeds.
        assert!(exchange.fetch_candles("BTCUSDT", Interval::H1, 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let exchange = MockExchange::new();
        let err = exchange
            .fetch_candles("NOPEUSDT", Interval::H1, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolUnknown { .. }));
    }
}

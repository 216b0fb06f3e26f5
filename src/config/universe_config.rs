use crate::config::{parse_bool, parse_usize};
use crate::domain::types::Interval;
use anyhow::Result;
use std::env;
use std::str::FromStr;

/// Which symbols the engine ticks on, and how.
#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub symbols: Vec<String>,
    pub interval: Interval,
    /// Higher timeframe used for MTF confirmation.
    pub htf_interval: Interval,
    /// Candles kept per (symbol, interval) ring.
    pub candle_capacity: usize,
    /// Candles requested per refresh.
    pub fetch_limit: usize,
    /// When several detectors fire on the same tick, take the best-scored
    /// candidate instead of the first in registration order.
    pub prefer_highest_score: bool,
}

impl UniverseConfig {
    pub fn from_env() -> Result<Self> {
        let symbols = env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT,ETHUSDT,SOLUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        let interval =
            Interval::from_str(&env::var("INTERVAL").unwrap_or_else(|_| "1h".to_string()))?;
        let htf_interval =
            Interval::from_str(&env::var("HTF_INTERVAL").unwrap_or_else(|_| "4h".to_string()))?;
        Ok(Self {
            symbols,
            interval,
            htf_interval,
            candle_capacity: parse_usize("CANDLE_CAPACITY", 500)?,
            fetch_limit: parse_usize("CANDLE_FETCH_LIMIT", 200)?,
            prefer_highest_score: parse_bool("PREFER_HIGHEST_SCORE", false)?,
        })
    }
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            interval: Interval::H1,
            htf_interval: Interval::H4,
            candle_capacity: 500,
            fetch_limit: 200,
            prefer_highest_score: false,
        }
    }
}

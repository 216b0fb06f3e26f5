use crate::config::{parse_f64, parse_u64, parse_usize};
use crate::domain::types::AssetGroup;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Candles of log-returns per Pearson computation.
    pub corr_window: usize,
    /// |rho| at or above this blocks outright.
    pub corr_block_threshold: f64,
    /// Lower edge of the penalty band; [penalty_floor, block) maps to
    /// a size multiplier in [0.5, 1.0].
    pub corr_penalty_floor: f64,
    /// Max concurrent open positions per asset group, per user.
    pub group_quotas: HashMap<AssetGroup, usize>,
    /// No repeat signal for the same (symbol, side) within this window.
    pub cooldown_min: u64,
    /// Signal history retention for cooldown checks, hours.
    pub history_hours: u64,
}

impl CorrelationConfig {
    pub fn from_env() -> Result<Self> {
        // GROUP_QUOTAS format: "BTC_HIGH=2,ETH_HIGH=2,LAYER1=3"
        let mut group_quotas = Self::default_quotas();
        if let Ok(raw) = env::var("GROUP_QUOTAS") {
            for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
                let (name, count) = pair
                    .split_once('=')
                    .with_context(|| format!("Malformed GROUP_QUOTAS entry: '{}'", pair))?;
                let group = AssetGroup::from_str(name.trim())?;
                let quota = count
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("Malformed quota in '{}'", pair))?;
                group_quotas.insert(group, quota);
            }
        }
        Ok(Self {
            corr_window: parse_usize("CORR_WINDOW", 100)?,
            corr_block_threshold: parse_f64("CORR_BLOCK_THRESHOLD", 0.85)?,
            corr_penalty_floor: parse_f64("CORR_PENALTY_FLOOR", 0.6)?,
            group_quotas,
            cooldown_min: parse_u64("COOLDOWN_MIN", 60)?,
            history_hours: parse_u64("SIGNAL_HISTORY_HOURS", 24)?,
        })
    }

    fn default_quotas() -> HashMap<AssetGroup, usize> {
        let mut quotas = HashMap::new();
        quotas.insert(AssetGroup::BtcHigh, 2);
        quotas.insert(AssetGroup::EthHigh, 2);
        quotas.insert(AssetGroup::Layer1, 3);
        quotas.insert(AssetGroup::DeFi, 3);
        quotas.insert(AssetGroup::Other, 4);
        quotas
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            corr_window: 100,
            corr_block_threshold: 0.85,
            corr_penalty_floor: 0.6,
            group_quotas: Self::default_quotas(),
            cooldown_min: 60,
            history_hours: 24,
        }
    }
}

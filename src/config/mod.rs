//! Configuration module for signalforge.
//!
//! Structured configuration loading from environment variables, organized
//! by concern: universe, scoring, sizing, lifecycle, correlation,
//! scheduler, notification.

mod correlation_config;
mod lifecycle_config;
mod notification_config;
mod scheduler_config;
mod scoring_config;
mod sizing_config;
mod universe_config;

pub use correlation_config::CorrelationConfig;
pub use lifecycle_config::LifecycleConfig;
pub use notification_config::NotificationConfig;
pub use scheduler_config::SchedulerConfig;
pub use scoring_config::ScoringConfig;
pub use sizing_config::SizingConfig;
pub use universe_config::UniverseConfig;

use anyhow::{Context, Result};
use std::env;

/// Main application configuration, aggregating all sub-modules.
#[derive(Debug, Clone)]
pub struct Config {
    pub universe: UniverseConfig,
    pub scoring: ScoringConfig,
    pub sizing: SizingConfig,
    pub lifecycle: LifecycleConfig,
    pub correlation: CorrelationConfig,
    pub scheduler: SchedulerConfig,
    pub notification: NotificationConfig,
    pub database_url: String,
    pub observability_enabled: bool,
    pub observability_interval_secs: u64,
    /// Chat IDs subscribed to signals. Each gets independent risk state.
    pub subscribed_users: Vec<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            universe: UniverseConfig::from_env()?,
            scoring: ScoringConfig::from_env()?,
            sizing: SizingConfig::from_env()?,
            lifecycle: LifecycleConfig::from_env()?,
            correlation: CorrelationConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
            notification: NotificationConfig::from_env()?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/signalforge.db".to_string()),
            observability_enabled: parse_bool("OBSERVABILITY_ENABLED", true)?,
            observability_interval_secs: parse_u64("OBSERVABILITY_INTERVAL", 60)?,
            subscribed_users: parse_i64_list("SUBSCRIBED_USERS")?,
        })
    }
}

pub(crate) fn parse_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<f64>()
            .with_context(|| format!("Failed to parse {} as f64: '{}'", key, v)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {} as u64: '{}'", key, v)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v
            .parse::<usize>()
            .with_context(|| format!("Failed to parse {} as usize: '{}'", key, v)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => anyhow::bail!("Failed to parse {} as bool: '{}'", key, v),
        },
        Err(_) => Ok(default),
    }
}

fn parse_i64_list(key: &str) -> Result<Vec<i64>> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| {
                s.trim()
                    .parse::<i64>()
                    .with_context(|| format!("Failed to parse {} entry: '{}'", key, s))
            })
            .collect(),
        _ => Ok(vec![0]),
    }
}

use crate::config::{parse_f64, parse_u64, parse_usize};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Token-bucket cap per user, messages per minute.
    pub per_user_rate_per_min: f64,
    /// Global token-bucket cap, messages per second.
    pub global_rate_per_sec: f64,
    /// Bounded dispatch queue; overflow drops newest with a reason code.
    pub dispatch_queue_size: usize,
    /// Max delivery attempts per message.
    pub max_attempts: u32,
    /// Total wall-clock budget across attempts, seconds.
    pub retry_budget_secs: u64,
    /// First backoff step, seconds; doubles per attempt unless the server
    /// dictates its own retry-after.
    pub backoff_base_secs: u64,
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            per_user_rate_per_min: parse_f64("PER_USER_RATE_PER_MIN", 20.0)?,
            global_rate_per_sec: parse_f64("GLOBAL_RATE_PER_SEC", 30.0)?,
            dispatch_queue_size: parse_usize("DISPATCH_QUEUE_SIZE", 256)?,
            max_attempts: parse_u64("DISPATCH_MAX_ATTEMPTS", 5)? as u32,
            retry_budget_secs: parse_u64("DISPATCH_RETRY_BUDGET_SECS", 30)?,
            backoff_base_secs: parse_u64("DISPATCH_BACKOFF_BASE_SECS", 1)?,
        })
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            per_user_rate_per_min: 20.0,
            global_rate_per_sec: 30.0,
            dispatch_queue_size: 256,
            max_attempts: 5,
            retry_budget_secs: 30,
            backoff_base_secs: 1,
        }
    }
}

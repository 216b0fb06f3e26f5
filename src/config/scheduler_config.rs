use crate::config::{parse_u64, parse_usize};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick cadence, seconds.
    pub tick_secs: u64,
    /// Worker pool bound; 0 means `min(cpu * 2, 32)`.
    pub worker_pool_size: usize,
    /// Per-symbol deadline as a multiple of the tick interval.
    pub tick_deadline_mult: u64,
    pub shutdown_timeout_secs: u64,
    /// Hour of day (UTC) the adaptive controller runs.
    pub adaptive_hour_utc: u32,
    /// Days of trade history the controller reads.
    pub adaptive_window_days: u64,
    /// Filter traces retained, in ticks.
    pub trace_retention_ticks: usize,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tick_secs: parse_u64("TICK_SECS", 60)?,
            worker_pool_size: parse_usize("WORKER_POOL_SIZE", 0)?,
            tick_deadline_mult: parse_u64("TICK_DEADLINE_MULT", 3)?,
            shutdown_timeout_secs: parse_u64("SHUTDOWN_TIMEOUT_SECS", 30)?,
            adaptive_hour_utc: parse_u64("ADAPTIVE_HOUR_UTC", 2)? as u32,
            adaptive_window_days: parse_u64("ADAPTIVE_WINDOW_DAYS", 14)?,
            trace_retention_ticks: parse_usize("TRACE_RETENTION_TICKS", 32)?,
        })
    }

    /// Effective pool size, bounded the same way regardless of host size.
    pub fn effective_pool_size(&self) -> usize {
        if self.worker_pool_size > 0 {
            return self.worker_pool_size;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus * 2).min(32)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            worker_pool_size: 0,
            tick_deadline_mult: 3,
            shutdown_timeout_secs: 30,
            adaptive_hour_utc: 2,
            adaptive_window_days: 14,
            trace_retention_ticks: 32,
        }
    }
}

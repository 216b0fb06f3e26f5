//! Prometheus metrics, push-based. No HTTP listener: a periodic reporter
//! logs the encoded registry to stdout for log-based collection.
//!
//! All metrics carry the `signalforge_` prefix.

use prometheus::{CounterVec, Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Engine ticks completed.
    pub ticks_total: IntCounter,
    /// Symbols skipped in a tick, by reason (timeout, stale, data).
    pub symbols_skipped_total: CounterVec,
    /// Gate blocks by stage.
    pub gate_blocks_total: CounterVec,
    /// Signals emitted (persisted and queued).
    pub signals_emitted_total: IntCounter,
    /// Lifecycle transitions by kind.
    pub lifecycle_events_total: CounterVec,
    /// Notification delivery outcomes.
    pub dispatch_delivered_total: IntCounter,
    pub dispatch_retries_total: IntCounter,
    pub dispatch_dead_letter_total: IntCounter,
    pub dispatch_overflow_total: IntCounter,
    /// Currently open positions.
    pub open_positions: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks_total = IntCounter::with_opts(Opts::new(
            "signalforge_ticks_total",
            "Engine ticks completed",
        ))?;
        registry.register(Box::new(ticks_total.clone()))?;

        let symbols_skipped_total = CounterVec::new(
            Opts::new(
                "signalforge_symbols_skipped_total",
                "Symbols skipped per tick by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(symbols_skipped_total.clone()))?;

        let gate_blocks_total = CounterVec::new(
            Opts::new("signalforge_gate_blocks_total", "Filter gate blocks by stage"),
            &["stage"],
        )?;
        registry.register(Box::new(gate_blocks_total.clone()))?;

        let signals_emitted_total = IntCounter::with_opts(Opts::new(
            "signalforge_signals_emitted_total",
            "Signals persisted and queued for dispatch",
        ))?;
        registry.register(Box::new(signals_emitted_total.clone()))?;

        let lifecycle_events_total = CounterVec::new(
            Opts::new(
                "signalforge_lifecycle_events_total",
                "Position lifecycle transitions by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(lifecycle_events_total.clone()))?;

        let dispatch_delivered_total = IntCounter::with_opts(Opts::new(
            "signalforge_dispatch_delivered_total",
            "Notifications delivered",
        ))?;
        registry.register(Box::new(dispatch_delivered_total.clone()))?;

        let dispatch_retries_total = IntCounter::with_opts(Opts::new(
            "signalforge_dispatch_retries_total",
            "Notification delivery retries",
        ))?;
        registry.register(Box::new(dispatch_retries_total.clone()))?;

        let dispatch_dead_letter_total = IntCounter::with_opts(Opts::new(
            "signalforge_dispatch_dead_letter_total",
            "Notifications dead-lettered after retry budget",
        ))?;
        registry.register(Box::new(dispatch_dead_letter_total.clone()))?;

        let dispatch_overflow_total = IntCounter::with_opts(Opts::new(
            "signalforge_dispatch_overflow_total",
            "Notifications dropped on a full dispatch queue",
        ))?;
        registry.register(Box::new(dispatch_overflow_total.clone()))?;

        let open_positions = IntGauge::with_opts(Opts::new(
            "signalforge_open_positions",
            "Currently open positions",
        ))?;
        registry.register(Box::new(open_positions.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            ticks_total,
            symbols_skipped_total,
            gate_blocks_total,
            signals_emitted_total,
            lifecycle_events_total,
            dispatch_delivered_total,
            dispatch_retries_total,
            dispatch_dead_letter_total,
            dispatch_overflow_total,
            open_positions,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Periodic reporter: logs the encoded registry with a stable prefix for
/// log aggregators to scrape.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.interval_secs.max(5)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.metrics.encode() {
                        Ok(text) => info!("METRICS:\n{}", text),
                        Err(e) => warn!("Failed to encode metrics: {:#}", e),
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

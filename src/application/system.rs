//! Engine assembly and lifecycle.
//!
//! `Engine::build` wires every component in dependency order: persistence
//! first, then the parameter snapshot, then correlation state rehydrated
//! from open positions, then the tick machinery. `start` spawns the
//! long-lived tasks; `EngineHandle::shutdown` drains them under a
//! deadline. No component reaches for a global: everything is owned here
//! and injected.

use crate::application::adaptive::AdaptiveController;
use crate::application::control::EngineControl;
use crate::application::filters::{DuplicateGuard, FilterPipeline};
use crate::application::lifecycle::{LifecycleManager, OutcomeRecorder};
use crate::application::market_data::{CandleStore, RegimeDetector, RegimeThresholds};
use crate::application::risk::{CorrelationManager, PositionSizer};
use crate::application::scheduler::{Scheduler, SchedulerDeps, TraceStore};
use crate::application::signal::{NotificationDispatcher, SignalEmitter};
use crate::application::strategies::{CompositeEngine, standard_detectors};
use crate::config::Config;
use crate::domain::parameters::{ParamStore, ParameterSnapshot};
use crate::domain::ports::{
    ExchangePort, NotificationPort, PassthroughModel, PersistencePort,
};
use crate::infrastructure::observability::{Metrics, MetricsReporter};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Engine {
    deps: Arc<SchedulerDeps>,
    control: Arc<EngineControl>,
    adaptive: Arc<AdaptiveController>,
    metrics: Arc<Metrics>,
}

impl Engine {
    pub async fn build(
        config: Config,
        exchange: Arc<dyn ExchangePort>,
        notifier: Arc<dyn NotificationPort>,
        persistence: Arc<dyn PersistencePort>,
    ) -> Result<Self> {
        // 1. Parameter snapshot: the persisted one wins over the baseline.
        let baseline = ParameterSnapshot::baseline(
            config.scoring.threshold_soft,
            config.scoring.threshold_strict,
            config.scoring.quality_min,
            config.scoring.min_composite_confidence,
        );
        let initial = match persistence
            .load_parameter_snapshot()
            .await
            .context("Failed to load parameter snapshot at startup")?
        {
            Some(snapshot) => {
                info!("Loaded parameter snapshot v{}", snapshot.version);
                snapshot
            }
            None => baseline,
        };
        let params = Arc::new(ParamStore::new(initial));

        let metrics = Arc::new(Metrics::new()?);
        let store = Arc::new(CandleStore::new(config.universe.candle_capacity));
        let correlation = Arc::new(CorrelationManager::new(config.correlation.clone()));
        let duplicate_guard = Arc::new(DuplicateGuard::new());
        let traces = Arc::new(TraceStore::new(config.scheduler.trace_retention_ticks));

        let dispatcher = NotificationDispatcher::start(
            notifier,
            persistence.clone(),
            config.notification.clone(),
            metrics.clone(),
        );

        let emitter = Arc::new(SignalEmitter::new(
            persistence.clone(),
            dispatcher.clone(),
            duplicate_guard.clone(),
            correlation.clone(),
            PositionSizer::new(config.sizing.clone()),
            config.lifecycle.clone(),
            config.scoring.clone(),
        ));

        let outcome = Arc::new(OutcomeRecorder::new(persistence.clone()));
        let lifecycle = Arc::new(LifecycleManager::new(
            config.lifecycle.clone(),
            persistence.clone(),
            dispatcher,
            outcome,
            correlation.clone(),
        ));

        // 2. Rehydrate: open positions re-register their correlation
        // footprint before the first tick can emit anything.
        let open = persistence
            .load_open_positions(None)
            .await
            .context("Failed to load open positions at startup")?;
        lifecycle.rehydrate(open).await;

        let pipeline = Arc::new(FilterPipeline::standard(
            correlation.clone(),
            store.clone(),
            persistence.clone(),
            duplicate_guard,
        ));

        let adaptive = Arc::new(AdaptiveController::new(
            persistence,
            params.clone(),
            config.scheduler.adaptive_window_days,
        ));

        let deps = Arc::new(SchedulerDeps {
            config,
            store: store.clone(),
            exchange,
            regime_detector: Arc::new(RegimeDetector::new(RegimeThresholds::default())),
            detectors: Arc::new(standard_detectors()),
            composite: CompositeEngine,
            pipeline,
            emitter,
            lifecycle: lifecycle.clone(),
            params,
            scoring_model: Arc::new(PassthroughModel),
            metrics: metrics.clone(),
            traces: traces.clone(),
            current_regime: Arc::new(RwLock::new(None)),
        });

        let control = Arc::new(EngineControl::new(
            correlation,
            lifecycle,
            traces,
            store,
            deps.config.universe.clone(),
        ));

        Ok(Self {
            deps,
            control,
            adaptive,
            metrics,
        })
    }

    /// Spawns the tick loop, lifecycle ticker, daily adaptive job and the
    /// metrics reporter. Returns the handle owning shutdown.
    pub fn start(self) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Arc::new(Scheduler::new(self.deps.clone()));

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(scheduler.clone().run(shutdown_rx.clone())));
        tasks.push(tokio::spawn(
            scheduler.clone().run_lifecycle_ticker(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(self.adaptive.clone().run_daily(
            self.deps.config.scheduler.adaptive_hour_utc,
            shutdown_rx.clone(),
        )));
        if self.deps.config.observability_enabled {
            let reporter = MetricsReporter::new(
                self.metrics.clone(),
                self.deps.config.observability_interval_secs,
            );
            tasks.push(tokio::spawn(reporter.run(shutdown_rx)));
        }

        info!(
            "Engine started: {} symbols, tick every {}s, lifecycle every {}s",
            self.deps.config.universe.symbols.len(),
            self.deps.config.scheduler.tick_secs,
            self.deps.config.lifecycle.tick_secs
        );

        EngineHandle {
            control: self.control,
            shutdown_timeout: Duration::from_secs(
                self.deps.config.scheduler.shutdown_timeout_secs,
            ),
            shutdown_tx,
            tasks,
        }
    }

    pub fn control(&self) -> Arc<EngineControl> {
        self.control.clone()
    }
}

pub struct EngineHandle {
    pub control: Arc<EngineControl>,
    shutdown_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Graceful stop: signal every task, then wait up to the shutdown
    /// deadline. Tasks still running after that are detached and their
    /// partially computed ticks discarded.
    pub async fn shutdown(self) {
        info!("Engine shutting down...");
        let _ = self.shutdown_tx.send(true);
        let drain = async {
            for task in self.tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!("Shutdown deadline exceeded; abandoning remaining tasks");
        }
        info!("Engine stopped");
    }
}

//! Notification dispatcher: a bounded queue drained by a single worker
//! with per-user and global token-bucket rate caps, exponential backoff
//! that honours server-provided retry-after, and a dead-letter queue once
//! the retry budget is spent. Overflow drops the newest message with a
//! recorded reason; delivery failure never blocks the tick path.

use crate::config::NotificationConfig;
use crate::domain::errors::NotifyError;
use crate::domain::ports::{
    LifecycleUpdate, MessageRef, NotificationPort, PersistencePort, SignalNotification,
};
use crate::infrastructure::observability::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum DispatchPayload {
    New {
        user_id: i64,
        signal_id: Uuid,
        notification: SignalNotification,
    },
    Update {
        user_id: i64,
        message_ref: MessageRef,
        patch: LifecycleUpdate,
    },
}

impl DispatchPayload {
    fn user_id(&self) -> i64 {
        match self {
            DispatchPayload::New { user_id, .. } => *user_id,
            DispatchPayload::Update { user_id, .. } => *user_id,
        }
    }

    fn describe(&self) -> String {
        match self {
            DispatchPayload::New { notification, .. } => {
                format!("signal {} {}", notification.symbol, notification.side)
            }
            DispatchPayload::Update { message_ref, .. } => {
                format!("update for {}", message_ref.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub payload: DispatchPayload,
    pub attempts: u32,
    pub last_error: String,
}

/// Classic token bucket; time injected for determinism.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct NotificationDispatcher {
    tx: mpsc::Sender<DispatchPayload>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    /// Builds the dispatcher and spawns its worker.
    pub fn start(
        notifier: Arc<dyn NotificationPort>,
        persistence: Arc<dyn PersistencePort>,
        config: NotificationConfig,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.dispatch_queue_size);
        let dead_letters = Arc::new(Mutex::new(Vec::new()));

        let dispatcher = Arc::new(Self {
            tx,
            dead_letters: dead_letters.clone(),
            metrics: metrics.clone(),
        });

        let worker = DispatchWorker {
            notifier,
            persistence,
            config,
            dead_letters,
            metrics,
            per_user: HashMap::new(),
        };
        tokio::spawn(worker.run(rx));

        dispatcher
    }

    /// Enqueues without blocking. On a full queue the newest message is
    /// dropped and the drop is recorded; the caller's state is already
    /// persisted, so nothing is lost but the ping.
    pub fn enqueue(&self, payload: DispatchPayload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(payload)) => {
                warn!("Dispatch queue full, dropping {}", payload.describe());
                self.metrics.dispatch_overflow_total.inc();
                false
            }
            Err(mpsc::error::TrySendError::Closed(payload)) => {
                error!("Dispatch worker gone, dropping {}", payload.describe());
                false
            }
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }
}

struct DispatchWorker {
    notifier: Arc<dyn NotificationPort>,
    persistence: Arc<dyn PersistencePort>,
    config: NotificationConfig,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    metrics: Arc<Metrics>,
    per_user: HashMap<i64, TokenBucket>,
}

impl DispatchWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<DispatchPayload>) {
        let mut global = TokenBucket::new(
            self.config.global_rate_per_sec.max(1.0),
            self.config.global_rate_per_sec,
        );

        while let Some(payload) = rx.recv().await {
            self.wait_for_tokens(&mut global, payload.user_id()).await;
            self.deliver_with_retries(payload).await;
        }
        info!("Notification dispatcher draining complete");
    }

    async fn wait_for_tokens(&mut self, global: &mut TokenBucket, user_id: i64) {
        let per_min = self.config.per_user_rate_per_min.max(1.0);
        loop {
            let now = Instant::now();
            let user_bucket = self
                .per_user
                .entry(user_id)
                .or_insert_with(|| TokenBucket::new(per_min, per_min / 60.0));
            if user_bucket.try_take(now) && global.try_take(now) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn deliver_with_retries(&mut self, payload: DispatchPayload) {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.retry_budget_secs);
        let mut attempt: u32 = 0;
        let mut last_error = String::new();

        while attempt < self.config.max_attempts {
            attempt += 1;
            match self.deliver_once(&payload).await {
                Ok(()) => {
                    self.metrics.dispatch_delivered_total.inc();
                    return;
                }
                Err(NotifyError::Flood { retry_after_secs }) => {
                    last_error = format!("flood, retry after {}s", retry_after_secs);
                    warn!(
                        "Flood control on {} (attempt {}): honouring {}s",
                        payload.describe(),
                        attempt,
                        retry_after_secs
                    );
                    self.metrics.dispatch_retries_total.inc();
                    // The server-provided backoff is authoritative.
                    let wait = Duration::from_secs(retry_after_secs);
                    if started.elapsed() + wait > budget {
                        break;
                    }
                    tokio::time::sleep(wait).await;
                }
                Err(NotifyError::DeliveryFailed { reason }) => {
                    last_error = reason;
                    self.metrics.dispatch_retries_total.inc();
                    // Exponential backoff with jitter to spread retry bursts.
                    let backoff = Duration::from_secs(
                        self.config.backoff_base_secs.saturating_mul(1 << (attempt - 1).min(6)),
                    ) + Duration::from_millis((rand::random::<f64>() * 250.0) as u64);
                    if started.elapsed() + backoff > budget {
                        break;
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        error!(
            "Dead-lettering {} after {} attempts: {}",
            payload.describe(),
            attempt,
            last_error
        );
        self.metrics.dispatch_dead_letter_total.inc();
        self.dead_letters.lock().await.push(DeadLetter {
            payload,
            attempts: attempt,
            last_error,
        });
    }

    async fn deliver_once(&self, payload: &DispatchPayload) -> Result<(), NotifyError> {
        match payload {
            DispatchPayload::New {
                user_id,
                signal_id,
                notification,
            } => {
                let message_ref = self.notifier.emit(*user_id, notification).await?;
                if let Err(e) = self
                    .persistence
                    .attach_message_ref(*signal_id, &message_ref)
                    .await
                {
                    warn!("Failed to attach message ref to {}: {:#}", signal_id, e);
                }
                Ok(())
            }
            DispatchPayload::Update {
                message_ref, patch, ..
            } => self.notifier.update(message_ref, patch).await,
        }
    }
}

//! Debounced, deduplicated unit reloads.

use super::WorkerPool;
use crate::error::{ReloadError, Result};
#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;
use crate::units::{LoadReport, UnitLoader};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What [`ReloadCoordinator::schedule_reload`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new reload was queued.
    Queued,
    /// A reload that will read the latest source is already pending.
    Coalesced,
    /// The unit is reloading now; one more reload will follow it.
    FollowUpQueued,
    /// The coordinator is shut down.
    Closed,
}

/// How the last reload of a unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// The unit is registered.
    Loaded {
        /// Handlers published
        handlers: usize,
    },
    /// The unit's source is gone and it was unregistered.
    Removed {
        /// Handlers removed
        handlers: usize,
    },
    /// The reload failed; the previous registration was kept.
    Failed {
        /// Failure cause
        reason: String,
    },
}

impl From<LoadReport> for ReloadOutcome {
    fn from(report: LoadReport) -> Self {
        match report {
            LoadReport::Loaded { handlers } => Self::Loaded { handlers },
            LoadReport::Removed { handlers } => Self::Removed { handlers },
        }
    }
}

/// Introspection record for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    /// Wall-clock time the last reload finished.
    pub last_completed: DateTime<Utc>,
    /// How it ended.
    pub outcome: ReloadOutcome,
    /// Reloads completed so far, successful or not.
    pub reload_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Debouncing,
    Running { rerun: bool },
}

#[derive(Default)]
struct State {
    phases: HashMap<String, Phase>,
    last_completed: HashMap<String, Instant>,
    status: HashMap<String, UnitStatus>,
    closed: bool,
}

struct Pending {
    unit: String,
    enqueued_at: Instant,
}

struct Inner {
    loader: Arc<dyn UnitLoader>,
    pool: Arc<WorkerPool>,
    debounce: Duration,
    state: Mutex<State>,
    queue_tx: mpsc::UnboundedSender<Pending>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Pending>>>,
    shutdown: watch::Sender<bool>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

/// Turns reload requests into at most one running reload per unit.
///
/// A request for an idle unit is queued and starts once the debounce
/// interval has passed since it was queued and since the unit's previous
/// reload finished. Requests arriving while the unit waits are absorbed; a
/// request arriving while it runs earns exactly one follow-up reload.
/// Distinct units reload concurrently, bounded by the [`WorkerPool`].
///
/// The consumer loop, [`run`](Self::run), must be spawned on the runtime.
#[derive(Clone)]
pub struct ReloadCoordinator {
    inner: Arc<Inner>,
}

impl ReloadCoordinator {
    /// Coordinator driving `loader` on `pool`.
    pub fn new(loader: Arc<dyn UnitLoader>, pool: Arc<WorkerPool>, debounce: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                loader,
                pool,
                debounce,
                state: Mutex::new(State::default()),
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                shutdown,
                #[cfg(feature = "metrics")]
                metrics: None,
            }),
        }
    }

    /// Record reloads into `metrics`.
    ///
    /// Must be called before the coordinator is cloned.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: ReloadMetrics) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.metrics = Some(metrics),
            None => warn!("Coordinator already shared; metrics not attached"),
        }
        self
    }

    /// The debounce interval.
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Request a reload of `unit`.
    pub fn schedule_reload(&self, unit: &str) -> ScheduleOutcome {
        let mut state = self.inner.state.lock();
        if state.closed {
            return ScheduleOutcome::Closed;
        }

        let outcome = match state.phases.get(unit).copied() {
            None => {
                let pending = Pending {
                    unit: unit.to_string(),
                    enqueued_at: Instant::now(),
                };
                if self.inner.queue_tx.send(pending).is_err() {
                    return ScheduleOutcome::Closed;
                }
                state.phases.insert(unit.to_string(), Phase::Debouncing);
                ScheduleOutcome::Queued
            }
            Some(Phase::Running { rerun: false }) => {
                state
                    .phases
                    .insert(unit.to_string(), Phase::Running { rerun: true });
                ScheduleOutcome::FollowUpQueued
            }
            Some(_) => ScheduleOutcome::Coalesced,
        };
        drop(state);

        #[cfg(feature = "metrics")]
        if outcome == ScheduleOutcome::Coalesced {
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_coalesced(unit);
            }
        }

        debug!(unit, ?outcome, "Reload requested");
        outcome
    }

    /// Reload the service configuration on the worker pool.
    ///
    /// Runs independently of unit reloads.
    ///
    /// # Errors
    ///
    /// Whatever the loader reports, or [`ReloadError::ShuttingDown`].
    pub async fn reload_config(&self) -> Result<()> {
        if self.inner.state.lock().closed {
            return Err(ReloadError::ShuttingDown);
        }

        let loader = Arc::clone(&self.inner.loader);
        let result = self.inner.pool.run(move || loader.reload_config()).await;
        let result = result.and_then(|inner| inner);

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_config_reload(result.is_ok());
        }

        if let Err(e) = &result {
            error!(error = %e, "Configuration reload failed; keeping previous configuration");
        }
        result
    }

    /// Last recorded status of `unit`.
    pub fn status(&self, unit: &str) -> Option<UnitStatus> {
        self.inner.state.lock().status.get(unit).cloned()
    }

    /// Whether `unit` is waiting to reload or reloading.
    pub fn is_processing(&self, unit: &str) -> bool {
        self.inner.state.lock().phases.contains_key(unit)
    }

    /// Units queued or waiting out their debounce.
    pub fn pending_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .phases
            .values()
            .filter(|phase| **phase == Phase::Debouncing)
            .count()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Consume the reload queue until shutdown.
    ///
    /// Only the first call does anything; the queue has one consumer.
    pub async fn run(&self) {
        let Some(mut queue) = self.inner.queue_rx.lock().take() else {
            warn!("Reload coordinator loop already running");
            return;
        };
        let mut stop = self.inner.shutdown.subscribe();
        if *stop.borrow() {
            return;
        }

        info!(debounce_ms = self.inner.debounce.as_millis() as u64, "Reload coordinator started");
        loop {
            tokio::select! {
                next = queue.recv() => match next {
                    Some(pending) => {
                        tokio::spawn(self.clone().drive(pending));
                    }
                    None => break,
                },
                _ = stop.changed() => break,
            }
        }
        info!("Reload coordinator stopped");
    }

    /// Stop accepting requests, abandon reloads still debouncing, and wait
    /// for in-flight pool work.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.phases.retain(|_, phase| *phase != Phase::Debouncing);
        }
        self.inner.shutdown.send_replace(true);
        self.inner.pool.shutdown().await;
    }

    async fn drive(self, pending: Pending) {
        let Pending { unit, enqueued_at } = pending;

        let ready_at = {
            let state = self.inner.state.lock();
            let since = state
                .last_completed
                .get(&unit)
                .map_or(enqueued_at, |done| (*done).max(enqueued_at));
            since + self.inner.debounce
        };

        let mut stop = self.inner.shutdown.subscribe();
        if *stop.borrow_and_update() {
            self.abandon(&unit);
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(ready_at) => {}
            _ = stop.changed() => {
                self.abandon(&unit);
                return;
            }
        }

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                state.phases.remove(&unit);
                return;
            }
            state.phases.insert(unit.clone(), Phase::Running { rerun: false });
        }

        #[cfg(feature = "metrics")]
        let timer = self.inner.metrics.as_ref().map(|m| m.start_reload(&unit));

        let loader = Arc::clone(&self.inner.loader);
        let name = unit.clone();
        let outcome = match self.inner.pool.run(move || loader.reload(&name)).await {
            Ok(Ok(report)) => {
                info!(unit = %unit, ?report, "Unit reloaded");
                ReloadOutcome::from(report)
            }
            Ok(Err(e)) => {
                error!(unit = %unit, error = %e, "Unit reload failed");
                ReloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(ReloadError::ShuttingDown) => {
                self.abandon(&unit);
                return;
            }
            Err(e) => {
                error!(unit = %unit, error = %e, "Unit reload worker failed");
                ReloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.inner.metrics, timer) {
            match &outcome {
                ReloadOutcome::Failed { .. } => metrics.record_reload_failure(&unit, timer),
                _ => metrics.record_reload_success(&unit, timer),
            }
        }

        self.finish(unit, outcome);
    }

    fn finish(&self, unit: String, outcome: ReloadOutcome) {
        let mut state = self.inner.state.lock();
        let rerun = matches!(
            state.phases.remove(&unit),
            Some(Phase::Running { rerun: true })
        );

        let now = Instant::now();
        state.last_completed.insert(unit.clone(), now);
        let reload_count = state.status.get(&unit).map_or(0, |s| s.reload_count) + 1;
        state.status.insert(
            unit.clone(),
            UnitStatus {
                last_completed: Utc::now(),
                outcome,
                reload_count,
            },
        );

        if rerun && !state.closed {
            let pending = Pending {
                unit: unit.clone(),
                enqueued_at: now,
            };
            if self.inner.queue_tx.send(pending).is_ok() {
                state.phases.insert(unit.clone(), Phase::Debouncing);
                debug!(unit = %unit, "Follow-up reload queued");
            }
        }
    }

    fn abandon(&self, unit: &str) {
        self.inner.state.lock().phases.remove(unit);
        debug!(unit, "Pending reload abandoned");
    }
}

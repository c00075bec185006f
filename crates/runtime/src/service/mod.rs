// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue service façade: the public surface of the runtime.
//!
//! Owns the local job index (a cache of the broker when one is connected),
//! the scheduler, the listener registry, and the workers it constructs.
//! Admission, retrieval, maintenance, health, and shutdown all go through
//! here.

mod jobs;
mod maintenance;
mod tenant;

pub use jobs::{AddItem, BulkError, BulkResult, JobFilter};
pub use tenant::{TenantContext, TenantQueue};

use crate::listeners::{ListenerRegistry, ListenerToken};
use crate::pool::WorkerPool;
use crate::scheduler::{Schedule, ScheduleConfig, ScheduleUpdate, Scheduler};
use crate::worker::{Processor, Worker, WorkerConfig};
use conveyor_broker::Broker;
use conveyor_core::{
    validate_name, Clock, HealthStatus, Job, JobId, JobOptions, JobState, QueueError, QueueEvent,
    QueueEventKind, SystemClock,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Age thresholds and per-bucket caps for [`QueueService::clean`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOptions {
    /// Completed jobs finished at least this long ago are removable.
    pub completed_age_ms: u64,
    /// Failed jobs finished at least this long ago are removable.
    pub failed_age_ms: u64,
    /// Max completed jobs removed per pass.
    pub completed_count: usize,
    /// Max failed jobs removed per pass.
    pub failed_count: usize,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            completed_age_ms: 0,
            failed_age_ms: 0,
            completed_count: 1000,
            failed_count: 5000,
        }
    }
}

/// Queue-wide defaults.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Options applied when an admission supplies none.
    pub default_job_options: JobOptions,
    pub cleanup: CleanupOptions,
}

/// Knobs for [`QueueService::shutdown`].
#[derive(Debug, Clone, Copy)]
pub struct ShutdownOptions {
    /// Bound on the graceful worker-stop attempt.
    pub timeout_ms: u64,
    /// Force-close workers when the graceful attempt times out.
    pub force_after_timeout: bool,
    /// Drop waiting jobs before closing.
    pub drain: bool,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self { timeout_ms: 30_000, force_after_timeout: false, drain: false }
    }
}

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Uninitialized,
    Ready,
    ShuttingDown,
}

conveyor_core::simple_display! {
    ServiceStatus {
        Uninitialized => "uninitialized",
        Ready => "ready",
        ShuttingDown => "shutting_down",
    }
}

/// The public surface of one named queue.
pub struct QueueService<C: Clock = SystemClock> {
    name: String,
    config: QueueConfig,
    status: Mutex<ServiceStatus>,
    /// Local job index. Authoritative without a broker; a cache otherwise.
    jobs: Mutex<IndexMap<JobId, Job>>,
    paused: AtomicBool,
    total_added: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    scheduler: Mutex<Option<Arc<Scheduler<C>>>>,
    broker: Mutex<Option<Arc<dyn Broker>>>,
    listeners: Arc<ListenerRegistry>,
    workers: Mutex<Vec<Arc<Worker<C>>>>,
    clock: C,
}

impl QueueService<SystemClock> {
    pub fn new(name: &str) -> Result<Self, QueueError> {
        Self::with_config(name, QueueConfig::default())
    }

    pub fn with_config(name: &str, config: QueueConfig) -> Result<Self, QueueError> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> QueueService<C> {
    pub fn with_clock(name: &str, config: QueueConfig, clock: C) -> Result<Self, QueueError> {
        validate_name(name)?;
        config.default_job_options.validate()?;
        Ok(Self {
            name: name.to_string(),
            config,
            status: Mutex::new(ServiceStatus::Uninitialized),
            jobs: Mutex::new(IndexMap::new()),
            paused: AtomicBool::new(false),
            total_added: AtomicU64::new(0),
            total_processed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            scheduler: Mutex::new(None),
            broker: Mutex::new(None),
            listeners: Arc::new(ListenerRegistry::new()),
            workers: Mutex::new(Vec::new()),
            clock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Dependency-inject the broker. Allowed before initialisation.
    pub fn set_broker(&self, broker: Arc<dyn Broker>) {
        *self.broker.lock() = Some(broker);
    }

    /// Bring the service up. Idempotent once ready; rejected mid-shutdown.
    pub fn initialize(&self) -> Result<(), QueueError> {
        {
            let mut status = self.status.lock();
            match *status {
                ServiceStatus::Ready => return Ok(()),
                ServiceStatus::ShuttingDown => {
                    return Err(QueueError::state(format!(
                        "queue '{}' is shutting down",
                        self.name
                    )));
                }
                ServiceStatus::Uninitialized => {}
            }
            *self.scheduler.lock() = Some(Arc::new(Scheduler::with_clock(self.clock.clone())));
            *status = ServiceStatus::Ready;
        }
        tracing::info!(queue = %self.name, "queue initialised");
        self.emit(QueueEvent::Ready { queue: self.name.clone() });
        Ok(())
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), QueueError> {
        match *self.status.lock() {
            ServiceStatus::Ready => Ok(()),
            status => Err(QueueError::state(format!(
                "queue '{}' is not initialized (status: {status})",
                self.name
            ))),
        }
    }

    pub(crate) fn broker(&self) -> Option<Arc<dyn Broker>> {
        self.broker.lock().clone()
    }

    pub(crate) fn emit(&self, event: QueueEvent) {
        self.listeners.emit(&event);
    }

    pub fn on(
        &self,
        kind: QueueEventKind,
        listener: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.listeners.on(kind, listener)
    }

    pub fn off(&self, kind: QueueEventKind, token: ListenerToken) -> bool {
        self.listeners.off(kind, token)
    }

    // ── Workers ─────────────────────────────────────────────────────────

    /// Build a worker bound to this queue. Its events fan out through the
    /// service's listener registry as well as the worker's own.
    pub fn create_worker(
        &self,
        processor: Processor,
        config: WorkerConfig,
    ) -> Result<Arc<Worker<C>>, QueueError> {
        self.ensure_ready()?;
        let worker = Arc::new(Worker::build(
            None,
            self.name.clone(),
            processor,
            config,
            self.clock.clone(),
            Some(Arc::clone(&self.listeners)),
        ));
        self.workers.lock().push(Arc::clone(&worker));
        Ok(worker)
    }

    /// Build a worker pool bound to this queue.
    pub fn create_worker_pool(
        &self,
        processor: Processor,
        config: WorkerConfig,
    ) -> Result<WorkerPool<C>, QueueError> {
        self.ensure_ready()?;
        Ok(WorkerPool::build(
            self.name.clone(),
            processor,
            config,
            self.clock.clone(),
            Some(Arc::clone(&self.listeners)),
        ))
    }

    // ── Scheduler ───────────────────────────────────────────────────────

    fn scheduler(&self) -> Result<Arc<Scheduler<C>>, QueueError> {
        self.scheduler.lock().clone().ok_or_else(|| {
            QueueError::state(format!("queue '{}' has no scheduler (not initialized)", self.name))
        })
    }

    pub fn add_schedule(&self, config: ScheduleConfig) -> Result<Schedule, QueueError> {
        self.ensure_ready()?;
        self.scheduler()?.add(config)
    }

    pub fn remove_schedule(&self, name: &str) -> Result<bool, QueueError> {
        self.ensure_ready()?;
        Ok(self.scheduler()?.remove(name))
    }

    pub fn get_schedules(&self) -> Result<Vec<Schedule>, QueueError> {
        self.ensure_ready()?;
        Ok(self.scheduler()?.get_all())
    }

    pub fn get_schedule(&self, name: &str) -> Result<Option<Schedule>, QueueError> {
        self.ensure_ready()?;
        Ok(self.scheduler()?.get(name))
    }

    pub fn update_schedule(
        &self,
        name: &str,
        update: ScheduleUpdate,
    ) -> Result<Option<Schedule>, QueueError> {
        self.ensure_ready()?;
        self.scheduler()?.update(name, update)
    }

    /// Materialise every due schedule as a normal submission, recording the
    /// execution first so a failing admission cannot double-fire.
    pub async fn run_due_schedules(&self) -> Result<Vec<JobId>, QueueError> {
        self.ensure_ready()?;
        let scheduler = self.scheduler()?;
        let mut ids = Vec::new();
        for schedule in scheduler.get_due() {
            scheduler.record_execution(&schedule.name)?;
            let mut opts = schedule.job_options.clone();
            opts.job_id = None;
            let id = self.add(&schedule.name, schedule.payload.clone(), Some(opts)).await?;
            tracing::debug!(queue = %self.name, schedule = %schedule.name, job = %id, "schedule fired");
            ids.push(id);
        }
        Ok(ids)
    }

    // ── Health and shutdown ─────────────────────────────────────────────

    /// Probe the service and its broker. Never raises.
    pub async fn health_check(&self) -> HealthStatus {
        let started = self.clock.now();
        let probe: Result<(), QueueError> = async {
            self.ensure_ready()?;
            if let Some(broker) = self.broker() {
                broker
                    .get_job_counts(&[JobState::Active])
                    .await
                    .map_err(|e| QueueError::wrap_external("broker health probe failed", &e))?;
            }
            Ok(())
        }
        .await;
        let response_time_ms =
            self.clock.now().saturating_duration_since(started).as_millis() as u64;
        match probe {
            Ok(()) => HealthStatus { healthy: true, error: None, response_time_ms },
            Err(e) => HealthStatus { healthy: false, error: Some(e.message), response_time_ms },
        }
    }

    /// Graceful shutdown: stop workers (bounded by `timeout_ms`, forced
    /// afterwards when requested), optionally drain, close the broker, and
    /// clear all local state. Idempotent once uninitialised.
    pub async fn shutdown(&self, options: ShutdownOptions) -> Result<(), QueueError> {
        {
            let mut status = self.status.lock();
            if *status == ServiceStatus::Uninitialized {
                return Ok(());
            }
            *status = ServiceStatus::ShuttingDown;
        }
        tracing::info!(queue = %self.name, timeout_ms = options.timeout_ms, "queue shutting down");

        let workers: Vec<Arc<Worker<C>>> = self.workers.lock().clone();
        let graceful = tokio::time::timeout(Duration::from_millis(options.timeout_ms), async {
            for worker in &workers {
                if let Err(e) = worker.stop(false).await {
                    tracing::warn!(queue = %self.name, error = %e, "worker failed to stop gracefully");
                }
            }
        })
        .await;

        if graceful.is_err() {
            if options.force_after_timeout {
                tracing::warn!(queue = %self.name, "graceful stop timed out, forcing workers closed");
                for worker in &workers {
                    if let Err(e) = worker.stop(true).await {
                        tracing::warn!(queue = %self.name, error = %e, "worker failed to force-stop");
                    }
                }
            } else {
                return Err(QueueError::timeout(format!(
                    "queue '{}' shutdown timed out after {}ms",
                    self.name, options.timeout_ms
                )));
            }
        }

        if options.drain {
            if let Some(broker) = self.broker() {
                if let Err(e) = broker.drain().await {
                    tracing::warn!(queue = %self.name, error = %e, "drain during shutdown failed");
                }
            }
            self.jobs
                .lock()
                .retain(|_, job| !matches!(job.state, JobState::Waiting | JobState::Paused));
        }

        let broker = self.broker.lock().take();
        if let Some(broker) = broker {
            if let Err(e) = broker.close().await {
                tracing::warn!(queue = %self.name, error = %e, "broker close failed");
            }
        }

        self.jobs.lock().clear();
        *self.scheduler.lock() = None;
        self.workers.lock().clear();
        self.paused.store(false, Ordering::SeqCst);
        self.total_added.store(0, Ordering::SeqCst);
        self.total_processed.store(0, Ordering::SeqCst);
        self.total_failed.store(0, Ordering::SeqCst);
        *self.status.lock() = ServiceStatus::Uninitialized;
        tracing::info!(queue = %self.name, "queue shut down");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../service_tests/mod.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue worker: runs the caller's processor against claimed jobs.
//!
//! A worker owns its lifecycle, its stats (including the rolling
//! processing-time window), and a listener registry. Claiming is delegated
//! to an injected [`BrokerDriver`]; the driver calls back into
//! [`Worker::process_job`] for every claim.

use crate::listeners::{ListenerRegistry, ListenerToken};
use conveyor_broker::{BrokerDriver, JobHandler, RateLimit};
use conveyor_core::{
    Clock, Job, QueueError, QueueEvent, QueueEventKind, SystemClock, WorkerId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Capacity of the rolling processing-time window.
pub const ROLLING_WINDOW_SIZE: usize = 100;

/// The caller-supplied job processor. Returns the job result or raises; the
/// worker never mutates the closure's state.
pub type Processor = Arc<
    dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<Value, QueueError>> + Send>> + Send + Sync,
>;

/// Wrap an async closure as a [`Processor`].
pub fn processor_fn<F, Fut>(f: F) -> Processor
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, QueueError>> + Send + 'static,
{
    Arc::new(move |job| Box::pin(f(job)))
}

/// Lifecycle state of a worker.
///
/// `closed → running ↔ paused → closing → closed`; `error` is terminal and
/// entered only when stopping itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Closed,
    Running,
    Paused,
    Closing,
    Error,
}

conveyor_core::simple_display! {
    WorkerStatus {
        Closed => "closed",
        Running => "running",
        Paused => "paused",
        Closing => "closing",
        Error => "error",
    }
}

/// Worker tuning.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Max jobs processed concurrently by this worker.
    pub concurrency: usize,
    /// Advisory claim throttle.
    pub rate_limit: Option<RateLimit>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 1, rate_limit: None }
    }
}

/// Point-in-time view of a worker's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub queue_name: String,
    pub status: WorkerStatus,
    pub active_jobs: u32,
    pub total_processed: u64,
    pub total_failed: u64,
    /// Completed jobs per wall-clock second since start, 2 decimals.
    pub jobs_per_second: f64,
    /// Integer mean over the rolling window; 0 when empty.
    pub avg_processing_time_ms: u64,
    pub started_at_ms: Option<u64>,
    pub last_activity_at_ms: Option<u64>,
}

struct StatsInner {
    active_jobs: u32,
    total_processed: u64,
    total_failed: u64,
    window: VecDeque<u64>,
    started_at_ms: Option<u64>,
    last_activity_at_ms: Option<u64>,
}

impl StatsInner {
    fn push_duration(&mut self, elapsed_ms: u64) {
        self.window.push_back(elapsed_ms);
        if self.window.len() > ROLLING_WINDOW_SIZE {
            self.window.pop_front();
        }
    }
}

/// Processes jobs for one queue.
pub struct Worker<C: Clock = SystemClock> {
    id: WorkerId,
    queue_name: String,
    processor: Processor,
    config: WorkerConfig,
    status: Mutex<WorkerStatus>,
    driver: Mutex<Option<Arc<dyn BrokerDriver>>>,
    stats: Mutex<StatsInner>,
    listeners: ListenerRegistry,
    /// Fan-out into the owning service's registry, when service-created.
    forward: Option<Arc<ListenerRegistry>>,
    clock: C,
}

/// Decrements `active_jobs` on every exit path, processor failures included.
struct ActiveGuard<'a, C: Clock> {
    worker: &'a Worker<C>,
}

impl<C: Clock> Drop for ActiveGuard<'_, C> {
    fn drop(&mut self) {
        let mut stats = self.worker.stats.lock();
        stats.active_jobs = stats.active_jobs.saturating_sub(1);
    }
}

impl Worker<SystemClock> {
    pub fn new(queue_name: impl Into<String>, processor: Processor, config: WorkerConfig) -> Self {
        Self::with_clock(queue_name, processor, config, SystemClock)
    }
}

impl<C: Clock> Worker<C> {
    pub fn with_clock(
        queue_name: impl Into<String>,
        processor: Processor,
        config: WorkerConfig,
        clock: C,
    ) -> Self {
        Self::build(None, queue_name, processor, config, clock, None)
    }

    pub(crate) fn build(
        id: Option<WorkerId>,
        queue_name: impl Into<String>,
        processor: Processor,
        config: WorkerConfig,
        clock: C,
        forward: Option<Arc<ListenerRegistry>>,
    ) -> Self {
        Self {
            id: id.unwrap_or_else(WorkerId::mint),
            queue_name: queue_name.into(),
            processor,
            config,
            status: Mutex::new(WorkerStatus::Closed),
            driver: Mutex::new(None),
            stats: Mutex::new(StatsInner {
                active_jobs: 0,
                total_processed: 0,
                total_failed: 0,
                window: VecDeque::with_capacity(ROLLING_WINDOW_SIZE),
                started_at_ms: None,
                last_activity_at_ms: None,
            }),
            listeners: ListenerRegistry::new(),
            forward,
            clock,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Inject the broker-side driver. Required before [`Worker::start`].
    pub fn set_broker_worker(&self, driver: Arc<dyn BrokerDriver>) {
        *self.driver.lock() = Some(driver);
    }

    /// The claim callback to hand to a broker driver.
    pub fn handler(self: &Arc<Self>) -> JobHandler {
        let worker = Arc::clone(self);
        Arc::new(move |job: Job| {
            let worker = Arc::clone(&worker);
            Box::pin(async move { worker.process_job(job).await })
        })
    }

    pub async fn start(&self) -> Result<(), QueueError> {
        {
            let status = *self.status.lock();
            match status {
                WorkerStatus::Running => return Ok(()),
                WorkerStatus::Closing | WorkerStatus::Error => {
                    return Err(QueueError::state(format!(
                        "worker '{}' cannot start while {status}",
                        self.id
                    )));
                }
                WorkerStatus::Closed | WorkerStatus::Paused => {}
            }
        }
        let driver = self.driver.lock().clone().ok_or_else(|| {
            QueueError::state(format!("worker '{}' has no broker driver", self.id))
        })?;
        driver.run().await?;
        driver.resume().await?;
        *self.status.lock() = WorkerStatus::Running;
        self.stats.lock().started_at_ms.get_or_insert(self.clock.epoch_ms());
        tracing::info!(worker = %self.id, queue = %self.queue_name, "worker started");
        self.emit(QueueEvent::Resumed { queue: self.queue_name.clone() });
        Ok(())
    }

    /// Stop claiming. With `wait_for_active`, in-flight jobs complete before
    /// the driver is paused.
    pub async fn pause(&self, wait_for_active: bool) -> Result<(), QueueError> {
        {
            let status = *self.status.lock();
            match status {
                WorkerStatus::Paused => return Ok(()),
                WorkerStatus::Running => {}
                _ => {
                    return Err(QueueError::state(format!(
                        "worker '{}' cannot pause while {status}",
                        self.id
                    )));
                }
            }
        }
        let driver = self.driver.lock().clone();
        if let Some(driver) = driver {
            driver.pause(!wait_for_active).await?;
        }
        *self.status.lock() = WorkerStatus::Paused;
        tracing::info!(worker = %self.id, "worker paused");
        self.emit(QueueEvent::Paused { queue: self.queue_name.clone() });
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        {
            let status = *self.status.lock();
            match status {
                WorkerStatus::Running => return Ok(()),
                WorkerStatus::Paused => {}
                _ => {
                    return Err(QueueError::state(format!(
                        "worker '{}' cannot resume while {status}",
                        self.id
                    )));
                }
            }
        }
        let driver = self.driver.lock().clone();
        if let Some(driver) = driver {
            driver.resume().await?;
        }
        *self.status.lock() = WorkerStatus::Running;
        tracing::info!(worker = %self.id, "worker resumed");
        self.emit(QueueEvent::Resumed { queue: self.queue_name.clone() });
        Ok(())
    }

    /// Graceful close; `force` abandons in-flight work. Failure to stop is
    /// terminal: the worker lands in `error` and cannot restart.
    pub async fn stop(&self, force: bool) -> Result<(), QueueError> {
        {
            let mut status = self.status.lock();
            if *status == WorkerStatus::Closed {
                return Ok(());
            }
            *status = WorkerStatus::Closing;
        }
        let driver = self.driver.lock().clone();
        if let Some(driver) = driver {
            if let Err(e) = driver.close(force).await {
                *self.status.lock() = WorkerStatus::Error;
                return Err(QueueError::wrap_external(
                    &format!("worker '{}' failed to stop", self.id),
                    &e,
                ));
            }
        }
        *self.status.lock() = WorkerStatus::Closed;
        tracing::info!(worker = %self.id, force, "worker stopped");
        Ok(())
    }

    /// Run the processor for one claimed job.
    ///
    /// Emits `active`, then exactly one of `completed`/`failed`. Failures
    /// (including timeouts) are recorded and re-raised so the driver can
    /// apply the job's retry policy.
    pub async fn process_job(&self, job: Job) -> Result<Value, QueueError> {
        let started = self.clock.now();
        {
            let mut stats = self.stats.lock();
            stats.active_jobs += 1;
            stats.last_activity_at_ms = Some(self.clock.epoch_ms());
        }
        let _guard = ActiveGuard { worker: self };
        self.emit(QueueEvent::Active { id: job.id.clone(), name: job.name.to_string() });

        let fut = (self.processor)(job.clone());
        let result = if job.opts.timeout_ms > 0 {
            match tokio::time::timeout(Duration::from_millis(job.opts.timeout_ms), fut).await {
                Ok(result) => result,
                Err(_) => Err(QueueError::timeout(format!(
                    "job '{}' timed out after {}ms",
                    job.id, job.opts.timeout_ms
                ))),
            }
        } else {
            fut.await
        };

        let elapsed_ms = self.clock.now().saturating_duration_since(started).as_millis() as u64;
        match &result {
            Ok(value) => {
                let mut stats = self.stats.lock();
                stats.total_processed += 1;
                stats.push_duration(elapsed_ms);
                stats.last_activity_at_ms = Some(self.clock.epoch_ms());
                drop(stats);
                tracing::info!(worker = %self.id, job = %job.id, elapsed_ms, "job completed");
                self.emit(QueueEvent::Completed {
                    id: job.id.clone(),
                    name: job.name.to_string(),
                    result: value.clone(),
                });
            }
            Err(e) => {
                let mut stats = self.stats.lock();
                stats.total_failed += 1;
                stats.push_duration(elapsed_ms);
                stats.last_activity_at_ms = Some(self.clock.epoch_ms());
                drop(stats);
                tracing::warn!(worker = %self.id, job = %job.id, elapsed_ms, error = %e, "job failed");
                self.emit(QueueEvent::Failed {
                    id: job.id.clone(),
                    name: job.name.to_string(),
                    error: e.message.clone(),
                });
            }
        }
        result
    }

    pub fn get_stats(&self) -> WorkerStats {
        let status = *self.status.lock();
        let stats = self.stats.lock();
        let elapsed_secs = stats
            .started_at_ms
            .map(|started| self.clock.epoch_ms().saturating_sub(started) as f64 / 1000.0)
            .unwrap_or(0.0);
        let jobs_per_second = if elapsed_secs > 0.0 {
            (stats.total_processed as f64 / elapsed_secs * 100.0).round() / 100.0
        } else {
            0.0
        };
        let avg_processing_time_ms = if stats.window.is_empty() {
            0
        } else {
            stats.window.iter().sum::<u64>() / stats.window.len() as u64
        };
        WorkerStats {
            id: self.id.clone(),
            queue_name: self.queue_name.clone(),
            status,
            active_jobs: stats.active_jobs,
            total_processed: stats.total_processed,
            total_failed: stats.total_failed,
            jobs_per_second,
            avg_processing_time_ms,
            started_at_ms: stats.started_at_ms,
            last_activity_at_ms: stats.last_activity_at_ms,
        }
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

    fn emit(&self, event: QueueEvent) {
        self.listeners.emit(&event);
        if let Some(forward) = &self.forward {
            forward.emit(&event);
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool: a scalable set of workers bound to one queue and processor.

use crate::listeners::ListenerRegistry;
use crate::worker::{Processor, Worker, WorkerConfig, WorkerStatus};
use conveyor_broker::{BrokerDriver, JobHandler};
use conveyor_core::{Clock, QueueError, SystemClock, WorkerId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Builds a broker driver for a freshly added worker.
pub type DriverFactory = Arc<dyn Fn(JobHandler) -> Arc<dyn BrokerDriver> + Send + Sync>;

/// Worker counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub running: usize,
    pub paused: usize,
    pub closed: usize,
}

/// Counter sums across the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_processed: u64,
    pub total_failed: u64,
    pub running_workers: usize,
    /// Mean of per-worker averages, over workers with at least one sample.
    pub avg_processing_time_ms: u64,
}

/// Manages N workers with collective lifecycle operations.
pub struct WorkerPool<C: Clock = SystemClock> {
    queue_name: String,
    processor: Processor,
    config: WorkerConfig,
    workers: Mutex<IndexMap<WorkerId, Arc<Worker<C>>>>,
    driver_factory: Mutex<Option<DriverFactory>>,
    forward: Option<Arc<ListenerRegistry>>,
    clock: C,
}

impl WorkerPool<SystemClock> {
    pub fn new(queue_name: impl Into<String>, processor: Processor, config: WorkerConfig) -> Self {
        Self::with_clock(queue_name, processor, config, SystemClock)
    }
}

impl<C: Clock> WorkerPool<C> {
    pub fn with_clock(
        queue_name: impl Into<String>,
        processor: Processor,
        config: WorkerConfig,
        clock: C,
    ) -> Self {
        Self::build(queue_name, processor, config, clock, None)
    }

    pub(crate) fn build(
        queue_name: impl Into<String>,
        processor: Processor,
        config: WorkerConfig,
        clock: C,
        forward: Option<Arc<ListenerRegistry>>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            processor,
            config,
            workers: Mutex::new(IndexMap::new()),
            driver_factory: Mutex::new(None),
            forward,
            clock,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Drivers for workers added after this call are built by `factory`.
    pub fn set_driver_factory(&self, factory: DriverFactory) {
        *self.driver_factory.lock() = Some(factory);
    }

    /// Add a worker. A minted id is used unless one is supplied.
    pub fn add(&self, id: Option<WorkerId>) -> Result<Arc<Worker<C>>, QueueError> {
        if let Some(id) = &id {
            if self.workers.lock().contains_key(id) {
                return Err(QueueError::validation(format!(
                    "worker '{id}' already exists in pool"
                )));
            }
        }
        let worker = Arc::new(Worker::build(
            id,
            self.queue_name.clone(),
            Arc::clone(&self.processor),
            self.config,
            self.clock.clone(),
            self.forward.clone(),
        ));
        if let Some(factory) = self.driver_factory.lock().clone() {
            worker.set_broker_worker(factory(worker.handler()));
        }
        self.workers.lock().insert(worker.id().clone(), Arc::clone(&worker));
        Ok(worker)
    }

    /// Stop and drop a worker. `false` for unknown ids.
    pub async fn remove(&self, id: &WorkerId, force: bool) -> Result<bool, QueueError> {
        let worker = self.workers.lock().shift_remove(id);
        match worker {
            Some(worker) => {
                worker.stop(force).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, id: &WorkerId) -> Option<Arc<Worker<C>>> {
        self.workers.lock().get(id).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<Worker<C>>> {
        self.workers.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }

    pub async fn start_all(&self) -> Result<(), QueueError> {
        let mut first_error = None;
        for worker in self.get_all() {
            if let Err(e) = worker.start().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn pause_all(&self, wait_for_active: bool) -> Result<(), QueueError> {
        let mut first_error = None;
        for worker in self.get_all() {
            if let Err(e) = worker.pause(wait_for_active).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn resume_all(&self) -> Result<(), QueueError> {
        let mut first_error = None;
        for worker in self.get_all() {
            if let Err(e) = worker.resume().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn stop_all(&self, force: bool) -> Result<(), QueueError> {
        let mut first_error = None;
        for worker in self.get_all() {
            if let Err(e) = worker.stop(force).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Grow or shrink to exactly `n` workers. New workers are started;
    /// surplus workers (most recently added first) are stopped gracefully.
    pub async fn scale_to(&self, n: usize) -> Result<(), QueueError> {
        while self.len() < n {
            let worker = self.add(None)?;
            worker.start().await?;
        }
        while self.len() > n {
            let last = self.workers.lock().last().map(|(id, _)| id.clone());
            match last {
                Some(id) => {
                    self.remove(&id, false).await?;
                }
                None => break,
            }
        }
        tracing::info!(queue = %self.queue_name, workers = n, "pool scaled");
        Ok(())
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        let workers = self.get_all();
        let mut stats = PoolStats { total_workers: workers.len(), ..PoolStats::default() };
        for worker in &workers {
            match worker.status() {
                WorkerStatus::Running => stats.running += 1,
                WorkerStatus::Paused => stats.paused += 1,
                WorkerStatus::Closed | WorkerStatus::Closing | WorkerStatus::Error => {
                    stats.closed += 1
                }
            }
        }
        stats
    }

    pub fn get_aggregated_stats(&self) -> AggregatedStats {
        let mut aggregated = AggregatedStats::default();
        let mut averages = Vec::new();
        for worker in self.get_all() {
            let stats = worker.get_stats();
            aggregated.total_processed += stats.total_processed;
            aggregated.total_failed += stats.total_failed;
            if stats.status == WorkerStatus::Running {
                aggregated.running_workers += 1;
            }
            if stats.total_processed + stats.total_failed > 0 {
                averages.push(stats.avg_processing_time_ms);
            }
        }
        if !averages.is_empty() {
            aggregated.avg_processing_time_ms =
                averages.iter().sum::<u64>() / averages.len() as u64;
        }
        aggregated
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

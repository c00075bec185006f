// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory broker: the broker-less product mode and the test double.
//!
//! Semantics match the external-broker contract exactly except for
//! persistence and cross-process visibility.

use crate::{Broker, BrokerDriver, JobHandler, RateLimit};
use async_trait::async_trait;
use conveyor_core::{
    compute_backoff_delay, create_job, should_retry, Clock, Job, JobId, JobOptions, JobState,
    QueueError, RemovalPolicy, SystemClock,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// How often the claim loop re-polls an idle or throttled queue.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct Slot {
    job: Job,
    /// Epoch ms at which a delayed job becomes claimable.
    eligible_at_ms: u64,
}

#[derive(Default)]
struct BrokerInner {
    slots: IndexMap<JobId, Slot>,
    paused: bool,
    closed: bool,
}

/// Ordered, atomically-claimable in-process job store.
pub struct MemoryBroker<C: Clock = SystemClock> {
    inner: Mutex<BrokerInner>,
    clock: C,
}

impl MemoryBroker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryBroker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryBroker<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { inner: Mutex::new(BrokerInner::default()), clock }
    }

    fn ensure_open(inner: &BrokerInner) -> Result<(), QueueError> {
        if inner.closed {
            return Err(QueueError::external("broker is closed"));
        }
        Ok(())
    }

    /// Move due delayed jobs into the claimable set. While the broker is
    /// paused, due jobs park in `paused` instead and unpark on resume.
    fn promote_due(inner: &mut BrokerInner, now_ms: u64) {
        let parked = if inner.paused { JobState::Paused } else { JobState::Waiting };
        for slot in inner.slots.values_mut() {
            if slot.job.state == JobState::Delayed && slot.eligible_at_ms <= now_ms {
                slot.job.state = parked;
            }
        }
    }

    fn insert_job(inner: &mut BrokerInner, mut job: Job) -> JobId {
        let eligible_at_ms = job.created_at_ms + job.opts.delay_ms;
        if job.opts.delay_ms > 0 {
            job.state = JobState::Delayed;
        } else if inner.paused {
            job.state = JobState::Paused;
        }
        let id = job.id.clone();
        inner.slots.insert(id.clone(), Slot { job, eligible_at_ms });
        id
    }

    /// Apply the settling job's removal policy: drop it outright, or prune
    /// the oldest terminal jobs of `state` beyond the keep-last-N cap.
    fn apply_removal_policy(
        inner: &mut BrokerInner,
        id: &JobId,
        state: JobState,
        policy: RemovalPolicy,
    ) {
        let keep = match policy {
            RemovalPolicy::Keep => return,
            RemovalPolicy::Remove => {
                inner.slots.shift_remove(id);
                return;
            }
            RemovalPolicy::Count(n) => n as usize,
        };
        let mut terminal: Vec<(JobId, u64)> = inner
            .slots
            .values()
            .filter(|s| s.job.state == state)
            .map(|s| (s.job.id.clone(), s.job.finished_at_ms.unwrap_or(s.job.created_at_ms)))
            .collect();
        if terminal.len() <= keep {
            return;
        }
        terminal.sort_by_key(|(_, finished)| *finished);
        for (id, _) in terminal.iter().take(terminal.len() - keep) {
            inner.slots.shift_remove(id);
        }
    }

    /// Atomically claim the next eligible job, consuming an attempt.
    ///
    /// Claim order is `(priority ascending, created_at ascending)`, then
    /// insertion order. Returns `None` when paused, closed, or idle.
    pub fn claim(&self) -> Option<Job> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        Self::promote_due(&mut inner, now_ms);
        if inner.paused {
            return None;
        }
        let slot = inner
            .slots
            .values_mut()
            .filter(|s| s.job.state == JobState::Waiting)
            .min_by_key(|s| (s.job.opts.priority, s.job.created_at_ms))?;
        slot.job.mark_active(now_ms);
        Some(slot.job.clone())
    }

    /// Record a successful run and settle the job.
    pub fn complete(&self, id: &JobId, result: Value) -> Result<(), QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(id)
            .ok_or_else(|| QueueError::state(format!("unknown job '{id}'")))?;
        slot.job.mark_completed(result, now_ms);
        let policy = slot.job.opts.remove_on_complete;
        Self::apply_removal_policy(&mut inner, id, JobState::Completed, policy);
        Ok(())
    }

    /// Record a failed attempt. Requeues with backoff while attempts remain,
    /// otherwise settles the job as failed. Returns the resulting state.
    pub fn record_failure(&self, id: &JobId, error: &str) -> Result<JobState, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .get_mut(id)
            .ok_or_else(|| QueueError::state(format!("unknown job '{id}'")))?;

        let job = &mut slot.job;
        job.failed_reason = Some(error.to_string());
        if should_retry(job.attempts_made, job.opts.attempts) {
            let delay_ms = compute_backoff_delay(&job.opts.backoff, job.attempts_made);
            slot.eligible_at_ms = now_ms + delay_ms;
            job.state = if delay_ms > 0 { JobState::Delayed } else { JobState::Waiting };
            let state = job.state;
            tracing::debug!(
                job = %id,
                attempt = job.attempts_made,
                delay_ms,
                "attempt failed, retry scheduled"
            );
            Ok(state)
        } else {
            job.mark_failed(error, None, now_ms);
            let policy = job.opts.remove_on_fail;
            tracing::warn!(job = %id, error, "job failed permanently");
            Self::apply_removal_policy(&mut inner, id, JobState::Failed, policy);
            Ok(JobState::Failed)
        }
    }
}

#[async_trait]
impl<C: Clock> Broker for MemoryBroker<C> {
    async fn add(&self, name: &str, payload: Value, opts: &JobOptions) -> Result<JobId, QueueError> {
        let job = create_job(name, payload, opts.clone(), &self.clock)?;
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        Ok(Self::insert_job(&mut inner, job))
    }

    async fn add_bulk(
        &self,
        items: Vec<(String, Value, JobOptions)>,
    ) -> Result<Vec<Result<JobId, QueueError>>, QueueError> {
        let mut results = Vec::with_capacity(items.len());
        for (name, payload, opts) in items {
            let result = match create_job(&name, payload, opts, &self.clock) {
                Ok(job) => {
                    let mut inner = self.inner.lock();
                    Self::ensure_open(&inner)?;
                    Ok(Self::insert_job(&mut inner, job))
                }
                Err(e) => Err(e),
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let mut inner = self.inner.lock();
        let now_ms = self.clock.epoch_ms();
        Self::promote_due(&mut inner, now_ms);
        Ok(inner.slots.get(id).map(|s| s.job.clone()))
    }

    async fn get_jobs(
        &self,
        states: Option<&[JobState]>,
        start: usize,
        end: usize,
    ) -> Result<Vec<Job>, QueueError> {
        let mut inner = self.inner.lock();
        let now_ms = self.clock.epoch_ms();
        Self::promote_due(&mut inner, now_ms);
        let matching: Vec<Job> = inner
            .slots
            .values()
            .filter(|s| states.map_or(true, |states| states.contains(&s.job.state)))
            .map(|s| s.job.clone())
            .collect();
        let start = start.min(matching.len());
        let end = end.clamp(start, matching.len());
        Ok(matching[start..end].to_vec())
    }

    async fn get_job_counts(
        &self,
        states: &[JobState],
    ) -> Result<HashMap<JobState, u64>, QueueError> {
        let mut inner = self.inner.lock();
        let now_ms = self.clock.epoch_ms();
        Self::promote_due(&mut inner, now_ms);
        let mut counts: HashMap<JobState, u64> = states.iter().map(|s| (*s, 0)).collect();
        for slot in inner.slots.values() {
            if let Some(count) = counts.get_mut(&slot.job.state) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn remove(&self, id: &JobId) -> Result<bool, QueueError> {
        Ok(self.inner.lock().slots.shift_remove(id).is_some())
    }

    /// Stops claims only: delayed jobs keep promoting while paused and park
    /// in `paused` until [`Broker::resume`] releases them.
    async fn pause(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        inner.paused = true;
        for slot in inner.slots.values_mut() {
            if slot.job.state == JobState::Waiting {
                slot.job.state = JobState::Paused;
            }
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        inner.paused = false;
        for slot in inner.slots.values_mut() {
            if slot.job.state == JobState::Paused {
                slot.job.state = JobState::Waiting;
            }
        }
        Ok(())
    }

    async fn drain(&self) -> Result<u64, QueueError> {
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        let before = inner.slots.len();
        inner
            .slots
            .retain(|_, s| !matches!(s.job.state, JobState::Waiting | JobState::Paused));
        Ok((before - inner.slots.len()) as u64)
    }

    async fn clean(
        &self,
        grace_ms: u64,
        limit: usize,
        state: JobState,
    ) -> Result<Vec<JobId>, QueueError> {
        if !state.is_terminal() {
            return Err(QueueError::validation(format!(
                "clean only applies to terminal states, got '{state}'"
            )));
        }
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        let removable: Vec<JobId> = inner
            .slots
            .values()
            .filter(|s| {
                s.job.state == state
                    && s.job.finished_at_ms.unwrap_or(s.job.created_at_ms) + grace_ms <= now_ms
            })
            .take(limit)
            .map(|s| s.job.id.clone())
            .collect();
        for id in &removable {
            inner.slots.shift_remove(id);
        }
        Ok(removable)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

/// Tuning for a [`MemoryDriver`].
#[derive(Debug, Clone, Copy)]
pub struct MemoryDriverConfig {
    /// Max jobs processed concurrently by this driver.
    pub concurrency: usize,
    pub rate_limit: Option<RateLimit>,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self { concurrency: 1, rate_limit: None }
    }
}

struct DriverShared {
    running: AtomicBool,
    paused: AtomicBool,
    active: AtomicUsize,
    /// Claim timestamps inside the sliding rate-limit window.
    claims: Mutex<VecDeque<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Claim loop for one worker against a [`MemoryBroker`].
pub struct MemoryDriver<C: Clock = SystemClock> {
    broker: Arc<MemoryBroker<C>>,
    handler: JobHandler,
    config: MemoryDriverConfig,
    shared: Arc<DriverShared>,
    clock: C,
}

impl<C: Clock> MemoryDriver<C> {
    pub fn new(broker: Arc<MemoryBroker<C>>, handler: JobHandler, config: MemoryDriverConfig) -> Self {
        let clock = broker.clock.clone();
        Self {
            broker,
            handler,
            config,
            shared: Arc::new(DriverShared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                active: AtomicUsize::new(0),
                claims: Mutex::new(VecDeque::new()),
                task: Mutex::new(None),
            }),
            clock,
        }
    }

    fn rate_allows(shared: &DriverShared, rate: Option<RateLimit>, now_ms: u64) -> bool {
        let Some(rate) = rate else { return true };
        let mut claims = shared.claims.lock();
        while claims.front().is_some_and(|t| t + rate.duration_ms <= now_ms) {
            claims.pop_front();
        }
        claims.len() < rate.max as usize
    }

    async fn wait_for_active_drain(shared: &DriverShared) {
        while shared.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl<C: Clock> BrokerDriver for MemoryDriver<C> {
    async fn run(&self) -> Result<(), QueueError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let broker = Arc::clone(&self.broker);
        let handler = Arc::clone(&self.handler);
        let shared = Arc::clone(&self.shared);
        let clock = self.clock.clone();
        let rate = self.config.rate_limit;
        let concurrency = self.config.concurrency.max(1);

        let task = tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(concurrency));
            while shared.running.load(Ordering::SeqCst) {
                if shared.paused.load(Ordering::SeqCst)
                    || !Self::rate_allows(&shared, rate, clock.epoch_ms())
                {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                };
                match broker.claim() {
                    Some(job) => {
                        if rate.is_some() {
                            shared.claims.lock().push_back(clock.epoch_ms());
                        }
                        shared.active.fetch_add(1, Ordering::SeqCst);
                        let broker = Arc::clone(&broker);
                        let handler = Arc::clone(&handler);
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            let id = job.id.clone();
                            let outcome = (handler)(job).await;
                            let settle = match outcome {
                                Ok(result) => broker.complete(&id, result),
                                Err(e) => broker.record_failure(&id, &e.message).map(|_| ()),
                            };
                            if let Err(e) = settle {
                                tracing::error!(job = %id, error = %e, "failed to settle job");
                            }
                            shared.active.fetch_sub(1, Ordering::SeqCst);
                            drop(permit);
                        });
                    }
                    None => {
                        drop(permit);
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }
        });
        *self.shared.task.lock() = Some(task);
        Ok(())
    }

    async fn pause(&self, do_not_wait_active: bool) -> Result<(), QueueError> {
        self.shared.paused.store(true, Ordering::SeqCst);
        if !do_not_wait_active {
            Self::wait_for_active_drain(&self.shared).await;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), QueueError> {
        self.shared.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, force: bool) -> Result<(), QueueError> {
        self.shared.running.store(false, Ordering::SeqCst);
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            if force {
                task.abort();
            } else {
                Self::wait_for_active_drain(&self.shared).await;
                task.await
                    .map_err(|e| QueueError::wrap_external("driver task failed on close", &e))?;
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

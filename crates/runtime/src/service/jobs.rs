// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission, retrieval, and per-job transitions.

use super::QueueService;
use conveyor_core::{
    create_job, filter_by_name, filter_by_state, paginate, sort_by_timestamp, Clock, Job, JobId,
    JobOptions, JobState, QueueError, QueueEvent, QueueStats, SortOrder,
};
use serde_json::Value;
use std::sync::atomic::Ordering;

/// One submission within [`QueueService::add_bulk`].
#[derive(Debug, Clone)]
pub struct AddItem {
    pub name: String,
    pub payload: Value,
    pub opts: Option<JobOptions>,
}

impl AddItem {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload, opts: None }
    }
}

/// Per-item failure inside a bulk admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkError {
    pub index: usize,
    pub message: String,
}

/// Aggregate of a bulk admission. Best-effort: one bad item never aborts
/// the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResult {
    pub added: usize,
    pub job_ids: Vec<JobId>,
    pub errors: Vec<BulkError>,
}

/// Retrieval filter: state, then name, then order, then pagination.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub states: Option<Vec<JobState>>,
    pub name: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub order: Option<SortOrder>,
}

impl<C: Clock> QueueService<C> {
    /// Validate, envelope, and admit one job. Emits `waiting`; the returned
    /// id is immediately visible to `get_job`.
    pub async fn add(
        &self,
        name: &str,
        payload: Value,
        opts: Option<JobOptions>,
    ) -> Result<JobId, QueueError> {
        self.ensure_ready()?;
        let opts = opts.unwrap_or_else(|| self.config.default_job_options.clone());
        let mut job = create_job(name, payload.clone(), opts, &self.clock)?;
        if job.opts.delay_ms > 0 {
            job.state = JobState::Delayed;
        } else if self.is_paused() {
            job.state = JobState::Paused;
        }

        if let Some(broker) = self.broker() {
            let mut broker_opts = job.opts.clone();
            broker_opts.job_id = Some(job.id.to_string());
            broker
                .add(name, payload, &broker_opts)
                .await
                .map_err(|e| QueueError::wrap_external("broker admission failed", &e))?;
        }

        let id = job.id.clone();
        let job_name = job.name.to_string();
        self.jobs.lock().insert(id.clone(), job);
        self.total_added.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(queue = %self.name, job = %id, name = %job_name, "job admitted");
        self.emit(QueueEvent::Waiting { id: id.clone(), name: job_name });
        Ok(id)
    }

    /// Admit many jobs, isolating per-item failures into the result.
    pub async fn add_bulk(&self, items: Vec<AddItem>) -> Result<BulkResult, QueueError> {
        self.ensure_ready()?;
        let mut result = BulkResult::default();
        for (index, item) in items.into_iter().enumerate() {
            match self.add(&item.name, item.payload, item.opts).await {
                Ok(id) => {
                    result.added += 1;
                    result.job_ids.push(id);
                }
                Err(e) => result.errors.push(BulkError { index, message: e.message }),
            }
        }
        Ok(result)
    }

    /// `None` for unknown ids. Prefers the broker's view and refreshes the
    /// local cache from it.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        self.ensure_ready()?;
        if let Some(broker) = self.broker() {
            let job = broker
                .get_job(id)
                .await
                .map_err(|e| QueueError::wrap_external("broker lookup failed", &e))?;
            if let Some(job) = job {
                self.jobs.lock().insert(id.clone(), job.clone());
                return Ok(Some(job));
            }
        }
        Ok(self.jobs.lock().get(id).cloned())
    }

    /// Retrieve jobs, applying state, name, order (default desc), and
    /// pagination, in that order.
    pub async fn get_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        self.ensure_ready()?;
        let source: Vec<Job> = match self.broker() {
            Some(broker) => broker
                .get_jobs(filter.states.as_deref(), 0, usize::MAX)
                .await
                .map_err(|e| QueueError::wrap_external("broker listing failed", &e))?,
            None => {
                let jobs = self.jobs.lock();
                let all: Vec<Job> = jobs.values().cloned().collect();
                match &filter.states {
                    Some(states) => filter_by_state(&all, states),
                    None => all,
                }
            }
        };
        let named = match &filter.name {
            Some(name) => filter_by_name(&source, name),
            None => source,
        };
        let ordered = sort_by_timestamp(&named, filter.order.unwrap_or_default());
        let start = filter.start.unwrap_or(0);
        let end = filter.end.unwrap_or(ordered.len());
        Ok(paginate(&ordered, start, end))
    }

    /// Per-state counts plus the cumulative admission total. Per-state
    /// figures come from the broker when one is connected.
    pub async fn get_job_counts(&self) -> Result<QueueStats, QueueError> {
        self.ensure_ready()?;
        let mut stats = QueueStats::default();
        match self.broker() {
            Some(broker) => {
                let counts = broker
                    .get_job_counts(&JobState::ALL)
                    .await
                    .map_err(|e| QueueError::wrap_external("broker counts failed", &e))?;
                for state in JobState::ALL {
                    stats.set(state, counts.get(&state).copied().unwrap_or(0));
                }
            }
            None => {
                let jobs = self.jobs.lock();
                for job in jobs.values() {
                    stats.set(job.state, stats.get(job.state) + 1);
                }
            }
        }
        stats.total = self.total_added.load(Ordering::SeqCst);
        Ok(stats)
    }

    /// Remove one job from the broker and the local index.
    pub async fn remove_job(&self, id: &JobId) -> Result<bool, QueueError> {
        self.ensure_ready()?;
        let broker_removed = match self.broker() {
            Some(broker) => broker
                .remove(id)
                .await
                .map_err(|e| QueueError::wrap_external("broker removal failed", &e))?,
            None => false,
        };
        let local_removed = self.jobs.lock().shift_remove(id).is_some();
        Ok(broker_removed || local_removed)
    }

    /// Record a progress update, clamped to `0..=100`. Unknown ids are
    /// ignored silently.
    pub fn update_progress(&self, id: &JobId, progress: i64) -> Result<(), QueueError> {
        self.ensure_ready()?;
        let clamped = {
            let mut jobs = self.jobs.lock();
            jobs.get_mut(id).map(|job| job.set_progress(progress))
        };
        if let Some(progress) = clamped {
            self.emit(QueueEvent::Progress { id: id.clone(), progress });
        }
        Ok(())
    }

    /// Settle a job as completed through the service (broker-less mode or
    /// embedder-driven completion).
    pub fn process_job(&self, id: &JobId, result: Value) -> Result<(), QueueError> {
        self.ensure_ready()?;
        let now_ms = self.clock.epoch_ms();
        let name = {
            let mut jobs = self.jobs.lock();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| QueueError::state(format!("unknown job '{id}'")))?;
            if job.started_at_ms.is_none() {
                job.mark_active(now_ms);
            }
            job.mark_completed(result.clone(), now_ms);
            job.name.to_string()
        };
        self.total_processed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(queue = %self.name, job = %id, "job completed");
        self.emit(QueueEvent::Completed { id: id.clone(), name, result });
        Ok(())
    }

    /// Settle a job as failed through the service.
    pub fn fail_job(&self, id: &JobId, error: &str) -> Result<(), QueueError> {
        self.ensure_ready()?;
        let now_ms = self.clock.epoch_ms();
        let name = {
            let mut jobs = self.jobs.lock();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| QueueError::state(format!("unknown job '{id}'")))?;
            if job.started_at_ms.is_none() {
                job.mark_active(now_ms);
            }
            job.mark_failed(error, None, now_ms);
            job.name.to_string()
        };
        self.total_failed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(queue = %self.name, job = %id, error, "job failed");
        self.emit(QueueEvent::Failed { id: id.clone(), name, error: error.to_string() });
        Ok(())
    }

    /// Resubmit a failed job under a fresh id, preserving name, payload,
    /// and options. The new job carries no link to the original.
    pub async fn retry_job(&self, id: &JobId) -> Result<JobId, QueueError> {
        self.ensure_ready()?;
        let job = self
            .get_job(id)
            .await?
            .ok_or_else(|| QueueError::state(format!("unknown job '{id}'")))?;
        if job.state != JobState::Failed {
            return Err(QueueError::state(format!(
                "job '{id}' cannot be retried from state '{}'",
                job.state
            )));
        }
        let mut opts = job.opts.clone();
        opts.job_id = None;
        self.add(job.name.as_str(), job.payload.clone(), Some(opts)).await
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pause/resume, drain, and cleanup.

use super::{CleanupOptions, QueueService};
use conveyor_core::{Clock, Job, JobId, JobState, QueueError, QueueEvent};
use indexmap::IndexMap;

impl<C: Clock> QueueService<C> {
    /// Stop claims. Waiting jobs park in `paused`; delayed jobs keep
    /// maturing and park as well until [`QueueService::resume`].
    pub async fn pause(&self) -> Result<(), QueueError> {
        self.ensure_ready()?;
        if let Some(broker) = self.broker() {
            broker
                .pause()
                .await
                .map_err(|e| QueueError::wrap_external("broker pause failed", &e))?;
        }
        self.paused.store(true, std::sync::atomic::Ordering::SeqCst);
        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values_mut() {
                if job.state == JobState::Waiting {
                    job.state = JobState::Paused;
                }
            }
        }
        tracing::info!(queue = %self.name, "queue paused");
        self.emit(QueueEvent::Paused { queue: self.name.clone() });
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        self.ensure_ready()?;
        if let Some(broker) = self.broker() {
            broker
                .resume()
                .await
                .map_err(|e| QueueError::wrap_external("broker resume failed", &e))?;
        }
        self.paused.store(false, std::sync::atomic::Ordering::SeqCst);
        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values_mut() {
                if job.state == JobState::Paused {
                    job.state = JobState::Waiting;
                }
            }
        }
        tracing::info!(queue = %self.name, "queue resumed");
        self.emit(QueueEvent::Resumed { queue: self.name.clone() });
        Ok(())
    }

    /// Remove all waiting jobs (including those parked by a pause). Active,
    /// delayed, and terminal jobs are untouched.
    pub async fn drain(&self) -> Result<u64, QueueError> {
        self.ensure_ready()?;
        let broker_removed = match self.broker() {
            Some(broker) => Some(
                broker
                    .drain()
                    .await
                    .map_err(|e| QueueError::wrap_external("broker drain failed", &e))?,
            ),
            None => None,
        };
        let local_removed = {
            let mut jobs = self.jobs.lock();
            let before = jobs.len();
            jobs.retain(|_, job| !matches!(job.state, JobState::Waiting | JobState::Paused));
            (before - jobs.len()) as u64
        };
        let removed = broker_removed.unwrap_or(local_removed);
        tracing::info!(queue = %self.name, removed, "queue drained");
        self.emit(QueueEvent::Drained { queue: self.name.clone(), removed });
        Ok(removed)
    }

    /// Remove terminal jobs older than the configured thresholds, capped
    /// per bucket. Returns the number removed and emits `cleaned`.
    pub async fn clean(&self, options: Option<CleanupOptions>) -> Result<u64, QueueError> {
        self.ensure_ready()?;
        let opts = options.unwrap_or(self.config.cleanup);
        let removed = match self.broker() {
            Some(broker) => {
                let completed = broker
                    .clean(opts.completed_age_ms, opts.completed_count, JobState::Completed)
                    .await
                    .map_err(|e| QueueError::wrap_external("broker clean failed", &e))?;
                let failed = broker
                    .clean(opts.failed_age_ms, opts.failed_count, JobState::Failed)
                    .await
                    .map_err(|e| QueueError::wrap_external("broker clean failed", &e))?;
                let mut jobs = self.jobs.lock();
                for id in completed.iter().chain(failed.iter()) {
                    jobs.shift_remove(id);
                }
                (completed.len() + failed.len()) as u64
            }
            None => {
                let now_ms = self.clock.epoch_ms();
                let mut jobs = self.jobs.lock();
                let completed = remove_terminal(
                    &mut jobs,
                    JobState::Completed,
                    opts.completed_age_ms,
                    opts.completed_count,
                    now_ms,
                );
                let failed = remove_terminal(
                    &mut jobs,
                    JobState::Failed,
                    opts.failed_age_ms,
                    opts.failed_count,
                    now_ms,
                );
                completed + failed
            }
        };
        tracing::info!(queue = %self.name, removed, "queue cleaned");
        self.emit(QueueEvent::Cleaned { queue: self.name.clone(), removed });
        Ok(removed)
    }
}

fn remove_terminal(
    jobs: &mut IndexMap<JobId, Job>,
    state: JobState,
    age_ms: u64,
    limit: usize,
    now_ms: u64,
) -> u64 {
    let removable: Vec<JobId> = jobs
        .values()
        .filter(|job| {
            job.state == state
                && job.finished_at_ms.unwrap_or(job.created_at_ms) + age_ms <= now_ms
        })
        .take(limit)
        .map(|job| job.id.clone())
        .collect();
    for id in &removable {
        jobs.shift_remove(id);
    }
    removable.len() as u64
}

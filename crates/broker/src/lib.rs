// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conveyor-broker: the broker contract and its in-memory implementation.
//!
//! A broker is the persistent, ordered, atomically-claimable work store
//! shared by every worker on a queue. The queue service talks to a
//! [`Broker`]; each worker is driven by a [`BrokerDriver`] that claims jobs
//! and hands them to the worker's [`JobHandler`].

mod memory;

pub use memory::{MemoryBroker, MemoryDriver, MemoryDriverConfig};

use async_trait::async_trait;
use conveyor_core::{Job, JobId, JobOptions, JobState, QueueError};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Callback a driver invokes for each claimed job. The handler runs the
/// worker's processor and reports the outcome back through its return value.
pub type JobHandler = Arc<
    dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<Value, QueueError>> + Send>> + Send + Sync,
>;

/// Sliding-window claim throttle: at most `max` claims per `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub duration_ms: u64,
}

/// A persistent, ordered, atomically-claimable work store.
///
/// Only the broker may move a job from `waiting` to `active`. Delivery order
/// between claims is `(priority ascending, created_at ascending)`, with
/// delayed jobs becoming eligible at `created_at + delay_ms`.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Durably record a job. Honours `opts.job_id` when supplied and respects
    /// `delay_ms`/`priority`.
    async fn add(&self, name: &str, payload: Value, opts: &JobOptions) -> Result<JobId, QueueError>;

    /// Per-item admission; the aggregate result preserves input order.
    async fn add_bulk(
        &self,
        items: Vec<(String, Value, JobOptions)>,
    ) -> Result<Vec<Result<JobId, QueueError>>, QueueError>;

    /// `None` for unknown ids.
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>, QueueError>;

    /// Jobs in the half-open window `[start, end)`, optionally state-filtered.
    async fn get_jobs(
        &self,
        states: Option<&[JobState]>,
        start: usize,
        end: usize,
    ) -> Result<Vec<Job>, QueueError>;

    /// Counts for the requested states; states with no jobs report 0.
    async fn get_job_counts(
        &self,
        states: &[JobState],
    ) -> Result<HashMap<JobState, u64>, QueueError>;

    /// Idempotent removal. `true` when a job was actually removed.
    async fn remove(&self, id: &JobId) -> Result<bool, QueueError>;

    /// Stop subsequent claims.
    async fn pause(&self) -> Result<(), QueueError>;

    async fn resume(&self) -> Result<(), QueueError>;

    /// Remove waiting jobs only; returns how many were dropped.
    async fn drain(&self) -> Result<u64, QueueError>;

    /// Remove terminal jobs of `state` finished at least `grace_ms` ago,
    /// at most `limit` of them. Returns the removed ids.
    async fn clean(
        &self,
        grace_ms: u64,
        limit: usize,
        state: JobState,
    ) -> Result<Vec<JobId>, QueueError>;

    /// Release resources. Subsequent operations fail.
    async fn close(&self) -> Result<(), QueueError>;
}

/// Worker-side driver: owns the claim loop for one worker.
#[async_trait]
pub trait BrokerDriver: Send + Sync {
    /// Start claiming. Idempotent while running.
    async fn run(&self) -> Result<(), QueueError>;

    /// Stop claiming. Unless `do_not_wait_active`, resolves only after
    /// in-flight jobs have drained.
    async fn pause(&self, do_not_wait_active: bool) -> Result<(), QueueError>;

    async fn resume(&self) -> Result<(), QueueError>;

    /// Stop the claim loop. `force` abandons in-flight work.
    async fn close(&self, force: bool) -> Result<(), QueueError>;

    fn is_running(&self) -> bool;

    fn is_paused(&self) -> bool;
}

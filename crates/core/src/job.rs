// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job envelope, options, state machine, and validation.

use crate::clock::Clock;
use crate::error::QueueError;
use crate::id::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Maximum accepted byte length for a job name.
pub const MAX_NAME_LEN: usize = 256;

/// Default number of delivery attempts per job.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Lifecycle state of a job.
///
/// Transitions obey `waiting ↔ delayed → active → (completed | failed)`;
/// `paused` parks waiting jobs while the queue is paused. A failed job only
/// re-enters the queue through an explicit retry, which mints a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
    Paused,
}

crate::simple_display! {
    JobState {
        Waiting => "waiting",
        Delayed => "delayed",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
        Paused => "paused",
    }
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Waiting,
        JobState::Delayed,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Paused,
    ];

    /// Terminal states never mutate except through removal or cleanup.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// The active set: states a live job moves through before settling.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed | JobState::Active)
    }
}

/// Backoff growth curve between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffStrategy {
    pub kind: BackoffKind,
    pub delay_ms: u64,
}

impl Default for BackoffStrategy {
    /// No delay between retries unless the caller asks for one.
    fn default() -> Self {
        Self { kind: BackoffKind::Fixed, delay_ms: 0 }
    }
}

/// What to do with a job once it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Keep the job in the store.
    Keep,
    /// Remove it as soon as it settles.
    Remove,
    /// Keep only the most recent N terminal jobs of that state.
    Count(u32),
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self::Keep
    }
}

/// Per-job options, merged over queue defaults at admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total delivery attempts (first run included). Must be ≥ 1.
    pub attempts: u32,
    pub backoff: BackoffStrategy,
    /// Lower is more urgent. Negative values are valid.
    pub priority: i32,
    /// Admission delay before the job becomes claimable.
    pub delay_ms: u64,
    /// Hard processing deadline; 0 disables it.
    pub timeout_ms: u64,
    pub remove_on_complete: RemovalPolicy,
    pub remove_on_fail: RemovalPolicy,
    /// Caller-supplied id override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: BackoffStrategy::default(),
            priority: 0,
            delay_ms: 0,
            timeout_ms: 0,
            remove_on_complete: RemovalPolicy::Keep,
            remove_on_fail: RemovalPolicy::Keep,
            job_id: None,
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.attempts < 1 {
            return Err(QueueError::validation("job attempts must be at least 1"));
        }
        if let Some(id) = &self.job_id {
            if id.is_empty() {
                return Err(QueueError::validation("job id override must not be empty"));
            }
        }
        Ok(())
    }
}

/// A unit of work flowing through a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: SmolStr,
    /// Opaque payload; `Value::Null` means "no payload".
    pub payload: Value,
    pub opts: JobOptions,
    pub state: JobState,
    /// Delivery attempts made so far; never exceeds `opts.attempts`.
    pub attempts_made: u32,
    /// Completion percentage, clamped to `0..=100`.
    pub progress: u8,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Clamp and store a progress update; returns the stored value.
    pub fn set_progress(&mut self, progress: i64) -> u8 {
        self.progress = clamp_progress(progress);
        self.progress
    }

    /// Record a claim: the job goes active and an attempt is consumed.
    pub fn mark_active(&mut self, now_ms: u64) {
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.started_at_ms = Some(now_ms);
    }

    pub fn mark_completed(&mut self, result: Value, now_ms: u64) {
        self.state = JobState::Completed;
        self.finished_at_ms = Some(now_ms);
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, reason: &str, stacktrace: Option<String>, now_ms: u64) {
        self.state = JobState::Failed;
        self.finished_at_ms = Some(now_ms);
        self.failed_reason = Some(reason.to_string());
        self.stacktrace = stacktrace;
    }
}

/// Clamp a progress value into `0..=100`. Idempotent.
pub fn clamp_progress(progress: i64) -> u8 {
    progress.clamp(0, 100) as u8
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')
}

/// Validate a job (or queue) name: `[A-Za-z0-9_.:-]+`, at most 256 bytes.
pub fn validate_name(name: &str) -> Result<(), QueueError> {
    if name.is_empty() {
        return Err(QueueError::validation("job name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(QueueError::validation(format!(
            "job name exceeds {MAX_NAME_LEN} bytes ({} bytes)",
            name.len()
        )));
    }
    if let Some(c) = name.chars().find(|c| !is_name_char(*c)) {
        return Err(QueueError::validation(format!("job name contains invalid character {c:?}")));
    }
    Ok(())
}

/// Reject payloads that cannot be serialised to JSON text.
pub fn validate_payload(payload: &Value) -> Result<(), QueueError> {
    serde_json::to_string(payload)
        .map(|_| ())
        .map_err(|e| QueueError::validation(format!("job payload is not serialisable: {e}")))
}

/// Validate and envelope a new job.
///
/// The job starts in `waiting` with zero attempts and zero progress; any
/// admission delay is applied by the store, not here.
pub fn create_job(
    name: &str,
    payload: Value,
    opts: JobOptions,
    clock: &impl Clock,
) -> Result<Job, QueueError> {
    validate_name(name)?;
    validate_payload(&payload)?;
    opts.validate()?;

    let id = match &opts.job_id {
        Some(id) => JobId::new(id),
        None => JobId::mint(clock),
    };

    Ok(Job {
        id,
        name: SmolStr::new(name),
        payload,
        opts,
        state: JobState::Waiting,
        attempts_made: 0,
        progress: 0,
        created_at_ms: clock.epoch_ms(),
        started_at_ms: None,
        finished_at_ms: None,
        result: None,
        failed_reason: None,
        stacktrace: None,
    })
}

/// Serialize a job to a self-describing record.
pub fn serialize_job(job: &Job) -> Result<Value, QueueError> {
    serde_json::to_value(job)
        .map_err(|e| QueueError::validation(format!("job is not serialisable: {e}")))
}

/// Rebuild a job from a record produced by [`serialize_job`].
pub fn deserialize_job(record: Value) -> Result<Job, QueueError> {
    serde_json::from_value(record)
        .map_err(|e| QueueError::validation(format!("job record is malformed: {e}")))
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

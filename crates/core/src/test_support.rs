// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::id::JobId;
use crate::job::{Job, JobOptions, JobState};
use serde_json::Value;
use smol_str::SmolStr;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for the job model.
pub mod strategies {
    use crate::job::{BackoffKind, BackoffStrategy, JobOptions, JobState, RemovalPolicy};
    use proptest::prelude::*;

    pub fn arb_job_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.:-]{1,64}"
    }

    pub fn arb_job_state() -> impl Strategy<Value = JobState> {
        prop_oneof![
            Just(JobState::Waiting),
            Just(JobState::Delayed),
            Just(JobState::Active),
            Just(JobState::Completed),
            Just(JobState::Failed),
            Just(JobState::Paused),
        ]
    }

    pub fn arb_backoff() -> impl Strategy<Value = BackoffStrategy> {
        (prop_oneof![Just(BackoffKind::Fixed), Just(BackoffKind::Exponential)], 0u64..60_000)
            .prop_map(|(kind, delay_ms)| BackoffStrategy { kind, delay_ms })
    }

    pub fn arb_removal_policy() -> impl Strategy<Value = RemovalPolicy> {
        prop_oneof![
            Just(RemovalPolicy::Keep),
            Just(RemovalPolicy::Remove),
            (1u32..100).prop_map(RemovalPolicy::Count),
        ]
    }

    pub fn arb_job_options() -> impl Strategy<Value = JobOptions> {
        (1u32..10, arb_backoff(), -100i32..100, 0u64..10_000, 0u64..10_000).prop_map(
            |(attempts, backoff, priority, delay_ms, timeout_ms)| JobOptions {
                attempts,
                backoff,
                priority,
                delay_ms,
                timeout_ms,
                ..JobOptions::default()
            },
        )
    }
}

// ── Job builder ─────────────────────────────────────────────────────────

/// Builder for jobs in arbitrary states, bypassing admission validation.
pub struct JobBuilder {
    id: String,
    name: String,
    payload: Value,
    opts: JobOptions,
    state: JobState,
    attempts_made: u32,
    progress: u8,
    created_at_ms: u64,
    finished_at_ms: Option<u64>,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self {
            id: "job-1".to_string(),
            name: "test-job".to_string(),
            payload: Value::Null,
            opts: JobOptions::default(),
            state: JobState::Waiting,
            attempts_made: 0,
            progress: 0,
            created_at_ms: 1_000_000,
            finished_at_ms: None,
        }
    }
}

impl JobBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn opts(mut self, opts: JobOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn attempts_made(mut self, attempts_made: u32) -> Self {
        self.attempts_made = attempts_made;
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = progress;
        self
    }

    pub fn created_at_ms(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }

    pub fn finished_at_ms(mut self, finished_at_ms: u64) -> Self {
        self.finished_at_ms = Some(finished_at_ms);
        self
    }

    pub fn build(self) -> Job {
        Job {
            id: JobId::new(self.id),
            name: SmolStr::new(self.name),
            payload: self.payload,
            opts: self.opts,
            state: self.state,
            attempts_made: self.attempts_made,
            progress: self.progress,
            created_at_ms: self.created_at_ms,
            started_at_ms: None,
            finished_at_ms: self.finished_at_ms,
            result: None,
            failed_reason: None,
            stacktrace: None,
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue statistics and health DTOs.

use crate::job::JobState;
use serde::{Deserialize, Serialize};

/// Per-state job counts plus the cumulative number of jobs ever admitted.
///
/// The per-state counts are point-in-time; `total` is a process-lifetime
/// monotonic counter and keeps growing as terminal jobs are removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub paused: u64,
    pub total: u64,
}

impl QueueStats {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Delayed => self.delayed,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Paused => self.paused,
        }
    }

    pub fn set(&mut self, state: JobState, count: u64) {
        match state {
            JobState::Waiting => self.waiting = count,
            JobState::Delayed => self.delayed = count,
            JobState::Active => self.active = count,
            JobState::Completed => self.completed = count,
            JobState::Failed => self.failed = count,
            JobState::Paused => self.paused = count,
        }
    }
}

/// Result of a health probe. Probes never raise; failures are reported in-band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: u64,
}

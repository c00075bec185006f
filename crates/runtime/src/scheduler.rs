// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named recurring schedules.
//!
//! Schedules live in memory only; they are re-materialised from their
//! patterns on startup. Firing is gated by the active flag, the optional
//! start/end window, and the optional execution limit.

use crate::cron::{SchedulePattern, Timezone};
use conveyor_core::{validate_name, Clock, JobOptions, QueueError, SystemClock};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for a new schedule.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub name: String,
    pub pattern: String,
    /// Default payload applied on each firing.
    pub payload: Value,
    /// Default job options applied on each firing.
    pub job_options: JobOptions,
    /// `UTC` (default) or a fixed `±HH:MM` offset.
    pub timezone: Option<String>,
    /// Deactivate after this many firings. Must be ≥ 1 when present.
    pub limit: Option<u64>,
    pub start_date_ms: Option<u64>,
    pub end_date_ms: Option<u64>,
}

impl ScheduleConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            payload: Value::Null,
            job_options: JobOptions::default(),
            timezone: None,
            limit: None,
            start_date_ms: None,
            end_date_ms: None,
        }
    }
}

/// Partial update for [`Scheduler::update`]. Absent fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub pattern: Option<String>,
    pub payload: Option<Value>,
    pub job_options: Option<JobOptions>,
    pub timezone: Option<String>,
    pub limit: Option<u64>,
    pub start_date_ms: Option<u64>,
    pub end_date_ms: Option<u64>,
}

/// A named recurring admission policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub pattern: String,
    pub active: bool,
    pub payload: Value,
    pub job_options: JobOptions,
    pub timezone: String,
    pub next_run_at_ms: Option<u64>,
    pub last_run_at_ms: Option<u64>,
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Schedule {
    fn parsed(&self) -> Result<(SchedulePattern, Timezone), QueueError> {
        Ok((SchedulePattern::parse(&self.pattern)?, Timezone::parse(&self.timezone)?))
    }
}

fn validate_window(start: Option<u64>, end: Option<u64>) -> Result<(), QueueError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(QueueError::validation(
                "schedule start date must be strictly before end date",
            ));
        }
    }
    Ok(())
}

/// Owns the named schedules of one queue.
pub struct Scheduler<C: Clock = SystemClock> {
    schedules: Mutex<IndexMap<String, Schedule>>,
    clock: C,
}

impl Scheduler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Scheduler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { schedules: Mutex::new(IndexMap::new()), clock }
    }

    /// Register a schedule. Rejects duplicate names and invalid patterns,
    /// timezones, windows, or limits.
    pub fn add(&self, config: ScheduleConfig) -> Result<Schedule, QueueError> {
        validate_name(&config.name)?;
        let pattern = SchedulePattern::parse(&config.pattern)?;
        let timezone = config.timezone.unwrap_or_else(|| "UTC".to_string());
        let tz = Timezone::parse(&timezone)?;
        validate_window(config.start_date_ms, config.end_date_ms)?;
        if let Some(limit) = config.limit {
            if limit < 1 {
                return Err(QueueError::validation("schedule limit must be at least 1"));
            }
        }
        config.job_options.validate()?;

        let now_ms = self.clock.epoch_ms();
        let anchor = config.start_date_ms.map_or(now_ms, |start| start.max(now_ms));
        let next_run_at_ms = pattern.next_after(anchor, &tz)?;

        let mut schedules = self.schedules.lock();
        if schedules.contains_key(&config.name) {
            return Err(QueueError::validation(format!(
                "schedule '{}' already exists",
                config.name
            )));
        }
        let schedule = Schedule {
            name: config.name.clone(),
            pattern: config.pattern,
            active: true,
            payload: config.payload,
            job_options: config.job_options,
            timezone,
            next_run_at_ms: Some(next_run_at_ms),
            last_run_at_ms: None,
            execution_count: 0,
            limit: config.limit,
            start_date_ms: config.start_date_ms,
            end_date_ms: config.end_date_ms,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        schedules.insert(config.name.clone(), schedule.clone());
        tracing::debug!(schedule = %config.name, next_run_at_ms, "schedule added");
        Ok(schedule)
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self.schedules.lock().shift_remove(name).is_some();
        if removed {
            tracing::debug!(schedule = name, "schedule removed");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Schedule> {
        self.schedules.lock().get(name).cloned()
    }

    pub fn get_all(&self) -> Vec<Schedule> {
        self.schedules.lock().values().cloned().collect()
    }

    pub fn get_active(&self) -> Vec<Schedule> {
        self.schedules.lock().values().filter(|s| s.active).cloned().collect()
    }

    /// Deactivate without removing. Returns false for unknown names.
    pub fn pause(&self, name: &str) -> bool {
        let mut schedules = self.schedules.lock();
        match schedules.get_mut(name) {
            Some(schedule) => {
                schedule.active = false;
                schedule.updated_at_ms = self.clock.epoch_ms();
                true
            }
            None => false,
        }
    }

    /// Reactivate and recompute the next run from now.
    pub fn resume(&self, name: &str) -> Result<bool, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut schedules = self.schedules.lock();
        let Some(schedule) = schedules.get_mut(name) else {
            return Ok(false);
        };
        let (pattern, tz) = schedule.parsed()?;
        schedule.active = true;
        schedule.next_run_at_ms = Some(pattern.next_after(now_ms, &tz)?);
        schedule.updated_at_ms = now_ms;
        Ok(true)
    }

    /// Apply a partial update. Pattern and timezone changes re-validate and
    /// recompute the next run. Returns `None` for unknown names.
    pub fn update(
        &self,
        name: &str,
        update: ScheduleUpdate,
    ) -> Result<Option<Schedule>, QueueError> {
        // Validate outside the entry so a bad update leaves the schedule intact.
        if let Some(pattern) = &update.pattern {
            SchedulePattern::parse(pattern)?;
        }
        if let Some(timezone) = &update.timezone {
            Timezone::parse(timezone)?;
        }
        if let Some(job_options) = &update.job_options {
            job_options.validate()?;
        }
        if let Some(limit) = update.limit {
            if limit < 1 {
                return Err(QueueError::validation("schedule limit must be at least 1"));
            }
        }

        let now_ms = self.clock.epoch_ms();
        let mut schedules = self.schedules.lock();
        let Some(schedule) = schedules.get_mut(name) else {
            return Ok(None);
        };

        let start = update.start_date_ms.or(schedule.start_date_ms);
        let end = update.end_date_ms.or(schedule.end_date_ms);
        validate_window(start, end)?;

        let recompute = update.pattern.is_some() || update.timezone.is_some();
        if let Some(pattern) = update.pattern {
            schedule.pattern = pattern;
        }
        if let Some(timezone) = update.timezone {
            schedule.timezone = timezone;
        }
        if let Some(payload) = update.payload {
            schedule.payload = payload;
        }
        if let Some(job_options) = update.job_options {
            schedule.job_options = job_options;
        }
        if let Some(limit) = update.limit {
            schedule.limit = Some(limit);
        }
        schedule.start_date_ms = start;
        schedule.end_date_ms = end;
        if recompute {
            let (pattern, tz) = schedule.parsed()?;
            schedule.next_run_at_ms = Some(pattern.next_after(now_ms, &tz)?);
        }
        schedule.updated_at_ms = now_ms;
        Ok(Some(schedule.clone()))
    }

    /// Record a firing: bump the counter, stamp `last_run_at`, recompute the
    /// next run, and deactivate once the limit is reached.
    pub fn record_execution(&self, name: &str) -> Result<Option<Schedule>, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut schedules = self.schedules.lock();
        let Some(schedule) = schedules.get_mut(name) else {
            return Ok(None);
        };
        let (pattern, tz) = schedule.parsed()?;
        schedule.execution_count += 1;
        schedule.last_run_at_ms = Some(now_ms);
        schedule.next_run_at_ms = Some(pattern.next_after(now_ms, &tz)?);
        if schedule.limit.is_some_and(|limit| schedule.execution_count >= limit) {
            schedule.active = false;
            tracing::debug!(schedule = name, limit = schedule.limit, "schedule limit reached");
        }
        schedule.updated_at_ms = now_ms;
        Ok(Some(schedule.clone()))
    }

    /// Active schedules due at or before now, honouring the start/end window.
    /// Schedules whose window has closed are deactivated lazily here.
    pub fn get_due(&self) -> Vec<Schedule> {
        let now_ms = self.clock.epoch_ms();
        let mut schedules = self.schedules.lock();
        let mut due = Vec::new();
        for schedule in schedules.values_mut() {
            if !schedule.active {
                continue;
            }
            if schedule.end_date_ms.is_some_and(|end| end < now_ms) {
                schedule.active = false;
                continue;
            }
            if schedule.start_date_ms.is_some_and(|start| start > now_ms) {
                continue;
            }
            if schedule.next_run_at_ms.is_some_and(|next| next <= now_ms) {
                due.push(schedule.clone());
            }
        }
        due
    }

    pub fn clear_all(&self) {
        self.schedules.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.schedules.lock().len()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

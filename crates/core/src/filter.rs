// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure collection helpers over job slices.
//!
//! All helpers clone the matching jobs; none of them mutate or raise.

use crate::job::{Job, JobState};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Sort direction for [`sort_by_timestamp`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Jobs whose state is in `states`.
pub fn filter_by_state(jobs: &[Job], states: &[JobState]) -> Vec<Job> {
    jobs.iter().filter(|j| states.contains(&j.state)).cloned().collect()
}

/// Jobs with the exact logical name.
pub fn filter_by_name(jobs: &[Job], name: &str) -> Vec<Job> {
    jobs.iter().filter(|j| j.name == name).cloned().collect()
}

/// Jobs ordered by creation time. The sort is stable, so relative order of
/// jobs with equal timestamps is preserved.
pub fn sort_by_timestamp(jobs: &[Job], order: SortOrder) -> Vec<Job> {
    let mut out: Vec<Job> = jobs.to_vec();
    match order {
        SortOrder::Asc => out.sort_by_key(|j| j.created_at_ms),
        SortOrder::Desc => out.sort_by_key(|j| Reverse(j.created_at_ms)),
    }
    out
}

/// The half-open window `[start, end)`, clamped to the slice bounds.
pub fn paginate(jobs: &[Job], start: usize, end: usize) -> Vec<Job> {
    let start = start.min(jobs.len());
    let end = end.clamp(start, jobs.len());
    jobs[start..end].to_vec()
}

/// Jobs bucketed by state. Only states that occur appear as keys.
pub fn group_by_state(jobs: &[Job]) -> HashMap<JobState, Vec<Job>> {
    let mut out: HashMap<JobState, Vec<Job>> = HashMap::new();
    for job in jobs {
        out.entry(job.state).or_default().push(job.clone());
    }
    out
}

/// Per-state occurrence counts. Only states that occur appear as keys.
pub fn count_by_state(jobs: &[Job]) -> HashMap<JobState, usize> {
    let mut out: HashMap<JobState, usize> = HashMap::new();
    for job in jobs {
        *out.entry(job.state).or_default() += 1;
    }
    out
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::JobBuilder;
use proptest::prelude::*;

fn sample() -> Vec<Job> {
    vec![
        JobBuilder::default().id("a").name("build").state(JobState::Waiting).created_at_ms(30).build(),
        JobBuilder::default().id("b").name("deploy").state(JobState::Completed).created_at_ms(10).build(),
        JobBuilder::default().id("c").name("build").state(JobState::Failed).created_at_ms(20).build(),
        JobBuilder::default().id("d").name("build").state(JobState::Waiting).created_at_ms(20).build(),
    ]
}

#[test]
fn filter_by_single_state() {
    let jobs = sample();
    let waiting = filter_by_state(&jobs, &[JobState::Waiting]);
    assert_eq!(waiting.len(), 2);
    assert!(waiting.iter().all(|j| j.state == JobState::Waiting));
}

#[test]
fn filter_by_multiple_states() {
    let jobs = sample();
    let terminal = filter_by_state(&jobs, &[JobState::Completed, JobState::Failed]);
    assert_eq!(terminal.len(), 2);
}

#[test]
fn filter_by_name_exact() {
    let jobs = sample();
    assert_eq!(filter_by_name(&jobs, "build").len(), 3);
    assert_eq!(filter_by_name(&jobs, "deploy").len(), 1);
    assert!(filter_by_name(&jobs, "bui").is_empty());
}

#[test]
fn sort_desc_is_default_direction() {
    let jobs = sample();
    let sorted = sort_by_timestamp(&jobs, SortOrder::default());
    let stamps: Vec<u64> = sorted.iter().map(|j| j.created_at_ms).collect();
    assert_eq!(stamps, vec![30, 20, 20, 10]);
}

#[test]
fn sort_is_stable_on_equal_timestamps() {
    let jobs = sample();
    let sorted = sort_by_timestamp(&jobs, SortOrder::Desc);
    // "c" precedes "d" in the input; both created at 20.
    assert_eq!(sorted[1].id, "c");
    assert_eq!(sorted[2].id, "d");
}

#[yare::parameterized(
    full      = { 0, 4, 4 },
    window    = { 1, 3, 2 },
    empty     = { 2, 2, 0 },
    clamped   = { 2, 99, 2 },
    inverted  = { 3, 1, 0 },
    past_end  = { 99, 100, 0 },
)]
fn paginate_half_open(start: usize, end: usize, expected_len: usize) {
    let jobs = sample();
    assert_eq!(paginate(&jobs, start, end).len(), expected_len);
}

#[test]
fn group_by_state_buckets() {
    let jobs = sample();
    let grouped = group_by_state(&jobs);
    assert_eq!(grouped[&JobState::Waiting].len(), 2);
    assert_eq!(grouped[&JobState::Completed].len(), 1);
    assert!(!grouped.contains_key(&JobState::Active));
}

#[test]
fn count_by_state_counts() {
    let jobs = sample();
    let counts = count_by_state(&jobs);
    assert_eq!(counts[&JobState::Waiting], 2);
    assert_eq!(counts[&JobState::Failed], 1);
    assert_eq!(counts.values().sum::<usize>(), jobs.len());
}

proptest! {
    // Filtering a sorted slice preserves the relative order of survivors.
    #[test]
    fn filter_after_sort_is_stable(stamps in proptest::collection::vec(0u64..50, 0..20)) {
        let jobs: Vec<Job> = stamps
            .iter()
            .enumerate()
            .map(|(i, ts)| {
                let state = if i % 2 == 0 { JobState::Waiting } else { JobState::Failed };
                JobBuilder::default().id(format!("j{i}")).state(state).created_at_ms(*ts).build()
            })
            .collect();
        let sorted = sort_by_timestamp(&jobs, SortOrder::Desc);
        let filtered = filter_by_state(&sorted, &[JobState::Waiting]);
        let resorted = sort_by_timestamp(&filtered, SortOrder::Desc);
        prop_assert_eq!(filtered, resorted);
    }
}

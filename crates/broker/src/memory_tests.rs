// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_core::{BackoffKind, BackoffStrategy, FakeClock};
use serde_json::json;
use std::time::Duration as StdDuration;

fn broker() -> (Arc<MemoryBroker<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    (Arc::new(MemoryBroker::with_clock(clock.clone())), clock)
}

fn opts() -> JobOptions {
    JobOptions::default()
}

#[tokio::test]
async fn add_and_get_round_trip() {
    let (broker, _) = broker();
    let id = broker.add("build", json!({"n": 1}), &opts()).await.unwrap();
    let job = broker.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.name, "build");
    assert_eq!(job.state, JobState::Waiting);
    assert!(broker.get_job(&JobId::new("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn add_honours_job_id_override() {
    let (broker, _) = broker();
    let with_id = JobOptions { job_id: Some("mine".to_string()), ..opts() };
    let id = broker.add("build", Value::Null, &with_id).await.unwrap();
    assert_eq!(id, "mine");
}

#[tokio::test]
async fn claim_respects_priority_then_age() {
    let (broker, clock) = broker();
    let slow = JobOptions { priority: 5, ..opts() };
    let urgent = JobOptions { priority: 1, ..opts() };
    let medium = JobOptions { priority: 3, ..opts() };

    broker.add("a", Value::Null, &slow).await.unwrap();
    clock.advance(StdDuration::from_millis(1));
    broker.add("b", Value::Null, &urgent).await.unwrap();
    clock.advance(StdDuration::from_millis(1));
    broker.add("c", Value::Null, &medium).await.unwrap();

    let order: Vec<String> =
        (0..3).filter_map(|_| broker.claim()).map(|j| j.name.to_string()).collect();
    assert_eq!(order, vec!["b", "c", "a"]);
    assert!(broker.claim().is_none());
}

#[tokio::test]
async fn claim_consumes_an_attempt() {
    let (broker, _) = broker();
    let id = broker.add("x", Value::Null, &opts()).await.unwrap();
    let claimed = broker.claim().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.state, JobState::Active);
    assert_eq!(claimed.attempts_made, 1);
}

#[tokio::test]
async fn delayed_jobs_become_eligible_after_delay() {
    let (broker, clock) = broker();
    let delayed = JobOptions { delay_ms: 500, ..opts() };
    let id = broker.add("later", Value::Null, &delayed).await.unwrap();

    assert_eq!(broker.get_job(&id).await.unwrap().unwrap().state, JobState::Delayed);
    assert!(broker.claim().is_none());

    clock.advance(StdDuration::from_millis(500));
    let claimed = broker.claim().unwrap();
    assert_eq!(claimed.id, id);
}

#[tokio::test]
async fn failure_requeues_with_exponential_backoff() {
    let (broker, clock) = broker();
    let retrying = JobOptions {
        attempts: 3,
        backoff: BackoffStrategy { kind: BackoffKind::Exponential, delay_ms: 100 },
        ..opts()
    };
    let id = broker.add("x", Value::Null, &retrying).await.unwrap();

    // First attempt fails: retry due 100ms later.
    broker.claim().unwrap();
    assert_eq!(broker.record_failure(&id, "boom").unwrap(), JobState::Delayed);
    clock.advance(StdDuration::from_millis(99));
    assert!(broker.claim().is_none());
    clock.advance(StdDuration::from_millis(1));

    // Second attempt fails: retry due another 200ms later.
    assert_eq!(broker.claim().unwrap().attempts_made, 2);
    assert_eq!(broker.record_failure(&id, "boom").unwrap(), JobState::Delayed);
    clock.advance(StdDuration::from_millis(199));
    assert!(broker.claim().is_none());
    clock.advance(StdDuration::from_millis(1));

    // Third attempt succeeds.
    assert_eq!(broker.claim().unwrap().attempts_made, 3);
    broker.complete(&id, json!("ok")).unwrap();
    let job = broker.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts_made, 3);
}

#[tokio::test]
async fn exhausted_attempts_settle_as_failed() {
    let (broker, _) = broker();
    let single = JobOptions { attempts: 1, ..opts() };
    let id = broker.add("x", Value::Null, &single).await.unwrap();
    broker.claim().unwrap();
    assert_eq!(broker.record_failure(&id, "boom").unwrap(), JobState::Failed);
    let job = broker.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.failed_reason.as_deref(), Some("boom"));
    assert!(broker.claim().is_none());
}

#[tokio::test]
async fn pause_parks_waiting_jobs_and_resume_releases_them() {
    let (broker, _) = broker();
    let id = broker.add("x", Value::Null, &opts()).await.unwrap();
    broker.pause().await.unwrap();

    assert_eq!(broker.get_job(&id).await.unwrap().unwrap().state, JobState::Paused);
    assert!(broker.claim().is_none());

    broker.resume().await.unwrap();
    assert_eq!(broker.get_job(&id).await.unwrap().unwrap().state, JobState::Waiting);
    assert!(broker.claim().is_some());
}

#[tokio::test]
async fn delayed_jobs_promote_while_paused() {
    let (broker, clock) = broker();
    let delayed = JobOptions { delay_ms: 100, ..opts() };
    let id = broker.add("later", Value::Null, &delayed).await.unwrap();
    broker.pause().await.unwrap();
    clock.advance(StdDuration::from_millis(100));

    // Due while paused: parked, not claimable.
    assert_eq!(broker.get_job(&id).await.unwrap().unwrap().state, JobState::Paused);
    assert!(broker.claim().is_none());

    broker.resume().await.unwrap();
    assert!(broker.claim().is_some());
}

#[tokio::test]
async fn drain_removes_waiting_only() {
    let (broker, _) = broker();
    let id_active = broker.add("a", Value::Null, &opts()).await.unwrap();
    broker.claim().unwrap();
    broker.add("b", Value::Null, &opts()).await.unwrap();
    let delayed = JobOptions { delay_ms: 10_000, ..opts() };
    let id_delayed = broker.add("c", Value::Null, &delayed).await.unwrap();

    assert_eq!(broker.drain().await.unwrap(), 1);
    assert!(broker.get_job(&id_active).await.unwrap().is_some());
    assert!(broker.get_job(&id_delayed).await.unwrap().is_some());
}

#[tokio::test]
async fn clean_removes_old_terminal_jobs() {
    let (broker, clock) = broker();
    let id_old = broker.add("a", Value::Null, &opts()).await.unwrap();
    broker.claim().unwrap();
    broker.complete(&id_old, Value::Null).unwrap();

    clock.advance(StdDuration::from_millis(5_000));
    let id_new = broker.add("b", Value::Null, &opts()).await.unwrap();
    broker.claim().unwrap();
    broker.complete(&id_new, Value::Null).unwrap();

    let removed = broker.clean(1_000, 100, JobState::Completed).await.unwrap();
    assert_eq!(removed, vec![id_old]);
    assert!(broker.get_job(&id_new).await.unwrap().is_some());
}

#[tokio::test]
async fn clean_rejects_non_terminal_states() {
    let (broker, _) = broker();
    assert!(broker.clean(0, 100, JobState::Waiting).await.is_err());
}

#[tokio::test]
async fn clean_on_empty_queue_removes_nothing() {
    let (broker, _) = broker();
    assert!(broker.clean(0, 100, JobState::Completed).await.unwrap().is_empty());
}

#[tokio::test]
async fn remove_is_idempotent() {
    let (broker, _) = broker();
    let id = broker.add("x", Value::Null, &opts()).await.unwrap();
    assert!(broker.remove(&id).await.unwrap());
    assert!(!broker.remove(&id).await.unwrap());
}

#[tokio::test]
async fn remove_on_complete_count_keeps_most_recent() {
    let (broker, clock) = broker();
    let keep_two = JobOptions { remove_on_complete: RemovalPolicy::Count(2), ..opts() };
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let id = broker.add(name, Value::Null, &keep_two).await.unwrap();
        broker.claim().unwrap();
        broker.complete(&id, Value::Null).unwrap();
        clock.advance(StdDuration::from_millis(10));
        ids.push(id);
    }
    assert!(broker.get_job(&ids[0]).await.unwrap().is_none());
    assert!(broker.get_job(&ids[1]).await.unwrap().is_some());
    assert!(broker.get_job(&ids[2]).await.unwrap().is_some());
}

#[tokio::test]
async fn add_bulk_preserves_order_and_isolates_errors() {
    let (broker, _) = broker();
    let results = broker
        .add_bulk(vec![
            ("ok-1".to_string(), Value::Null, opts()),
            ("bad name!".to_string(), Value::Null, opts()),
            ("ok-2".to_string(), Value::Null, opts()),
        ])
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
}

#[tokio::test]
async fn closed_broker_rejects_admissions() {
    let (broker, _) = broker();
    broker.close().await.unwrap();
    assert!(broker.add("x", Value::Null, &opts()).await.is_err());
    assert!(broker.claim().is_none());
}

#[tokio::test]
async fn get_job_counts_defaults_missing_states_to_zero() {
    let (broker, _) = broker();
    broker.add("x", Value::Null, &opts()).await.unwrap();
    let counts = broker.get_job_counts(&JobState::ALL).await.unwrap();
    assert_eq!(counts[&JobState::Waiting], 1);
    assert_eq!(counts[&JobState::Failed], 0);
    assert_eq!(counts.len(), 6);
}

// ── Driver ──────────────────────────────────────────────────────────────

fn counting_handler() -> (JobHandler, Arc<Mutex<Vec<String>>>) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let handler: JobHandler = Arc::new(move |job: Job| {
        let seen = Arc::clone(&seen_in);
        Box::pin(async move {
            seen.lock().push(job.name.to_string());
            Ok(json!("done"))
        })
    });
    (handler, seen)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(2)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn driver_processes_jobs_to_completion() {
    let (broker, _) = broker();
    let (handler, seen) = counting_handler();
    let id = broker.add("only", Value::Null, &opts()).await.unwrap();

    let driver = MemoryDriver::new(Arc::clone(&broker), handler, MemoryDriverConfig::default());
    driver.run().await.unwrap();
    assert!(driver.is_running());

    wait_until(|| seen.lock().len() == 1).await;
    // A graceful close waits for the in-flight job to settle.
    driver.close(false).await.unwrap();
    let job = broker.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(!driver.is_running());
}

#[tokio::test]
async fn paused_driver_claims_nothing() {
    let (broker, _) = broker();
    let (handler, seen) = counting_handler();
    let driver = MemoryDriver::new(Arc::clone(&broker), handler, MemoryDriverConfig::default());
    driver.run().await.unwrap();
    driver.pause(false).await.unwrap();
    assert!(driver.is_paused());

    broker.add("x", Value::Null, &opts()).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(seen.lock().is_empty());

    driver.resume().await.unwrap();
    wait_until(|| seen.lock().len() == 1).await;
    driver.close(false).await.unwrap();
}

#[tokio::test]
async fn rate_limit_caps_claims_per_window() {
    let (broker, _) = broker();
    let (handler, seen) = counting_handler();
    for i in 0..5 {
        broker.add(format!("j{i}").as_str(), Value::Null, &opts()).await.unwrap();
    }
    let config = MemoryDriverConfig {
        concurrency: 5,
        rate_limit: Some(RateLimit { max: 2, duration_ms: 60_000 }),
    };
    // FakeClock never advances, so the window never slides: only 2 claims ever.
    let driver = MemoryDriver::new(Arc::clone(&broker), handler, config);
    driver.run().await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(60)).await;
    assert_eq!(seen.lock().len(), 2);
    driver.close(true).await.unwrap();
}

#[tokio::test]
async fn run_twice_is_idempotent() {
    let (broker, _) = broker();
    let (handler, _) = counting_handler();
    let driver = MemoryDriver::new(Arc::clone(&broker), handler, MemoryDriverConfig::default());
    driver.run().await.unwrap();
    driver.run().await.unwrap();
    driver.close(true).await.unwrap();
}

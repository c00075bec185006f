// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_core::JobState;
use std::time::Duration;

#[tokio::test]
async fn pause_and_resume_emit_and_flip_states() {
    let (service, _) = service();
    let log = record_events(&service);
    let id = service.add("x", json!(null), None).await.unwrap();

    service.pause().await.unwrap();
    assert!(service.is_paused());
    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.paused, 1);
    assert_eq!(counts.waiting, 0);

    service.resume().await.unwrap();
    assert!(!service.is_paused());
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().state, JobState::Waiting);
    assert_eq!(
        *log.lock(),
        vec!["waiting".to_string(), "paused".to_string(), "resumed".to_string()]
    );
}

#[tokio::test]
async fn pause_with_broker_stops_claims() {
    let (service, broker, _) = service_with_broker();
    service.add("x", json!(null), None).await.unwrap();
    service.pause().await.unwrap();
    assert!(broker.claim().is_none());
    service.resume().await.unwrap();
    assert!(broker.claim().is_some());
}

#[tokio::test]
async fn drain_removes_waiting_jobs_only() {
    let (service, _) = service();
    let log = record_events(&service);
    service.add("a", json!(null), None).await.unwrap();
    service.add("b", json!(null), None).await.unwrap();
    let done = service.add("c", json!(null), None).await.unwrap();
    service.process_job(&done, json!(null)).unwrap();

    let removed = service.drain().await.unwrap();
    assert_eq!(removed, 2);

    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.waiting, 0);
    assert_eq!(counts.completed, 1);
    assert!(log.lock().contains(&"drained".to_string()));
}

#[tokio::test]
async fn drain_with_broker_reconciles_the_cache() {
    let (service, broker, _) = service_with_broker();
    service.add("a", json!(null), None).await.unwrap();
    service.add("b", json!(null), None).await.unwrap();

    let removed = service.drain().await.unwrap();
    assert_eq!(removed, 2);
    let counts = broker.get_job_counts(&[JobState::Waiting]).await.unwrap();
    assert_eq!(counts[&JobState::Waiting], 0);
    assert!(service.get_jobs(JobFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn clean_removes_old_terminal_jobs() {
    let (service, clock) = service();
    let old = service.add("old", json!(null), None).await.unwrap();
    service.process_job(&old, json!(null)).unwrap();
    let failed = service.add("bad", json!(null), None).await.unwrap();
    service.fail_job(&failed, "boom").unwrap();

    clock.advance(Duration::from_secs(60));
    let fresh = service.add("fresh", json!(null), None).await.unwrap();
    service.process_job(&fresh, json!(null)).unwrap();

    let options = CleanupOptions { completed_age_ms: 30_000, failed_age_ms: 30_000, ..CleanupOptions::default() };
    let removed = service.clean(Some(options)).await.unwrap();
    assert_eq!(removed, 2);
    assert!(service.get_job(&old).await.unwrap().is_none());
    assert!(service.get_job(&failed).await.unwrap().is_none());
    assert!(service.get_job(&fresh).await.unwrap().is_some());
}

#[tokio::test]
async fn clean_respects_per_bucket_caps() {
    let (service, _) = service();
    for i in 0..5 {
        let id = service.add(format!("job-{i}").as_str(), json!(null), None).await.unwrap();
        service.process_job(&id, json!(null)).unwrap();
    }
    let options = CleanupOptions { completed_count: 2, ..CleanupOptions::default() };
    assert_eq!(service.clean(Some(options)).await.unwrap(), 2);
    assert_eq!(service.get_job_counts().await.unwrap().completed, 3);
}

#[tokio::test]
async fn clean_on_empty_queue_returns_zero() {
    let (service, _) = service();
    assert_eq!(service.clean(None).await.unwrap(), 0);
}

#[tokio::test]
async fn default_cleanup_caps_are_exposed() {
    let options = CleanupOptions::default();
    assert_eq!(options.completed_count, 1000);
    assert_eq!(options.failed_count, 5000);
}

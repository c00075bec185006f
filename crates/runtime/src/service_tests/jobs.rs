// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_core::{JobOptions, JobState, SortOrder};

#[tokio::test]
async fn add_makes_the_job_visible() {
    let (service, _) = service();
    let log = record_events(&service);
    let id = service
        .add("analyse-repo", json!({"repo": "r1"}), Some(JobOptions { attempts: 2, ..JobOptions::default() }))
        .await
        .unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.name, "analyse-repo");
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.opts.attempts, 2);

    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.total, 1);
    assert_eq!(*log.lock(), vec!["waiting".to_string()]);
}

#[tokio::test]
async fn add_applies_queue_defaults() {
    let (service, _) = service();
    let id = service.add("x", json!(null), None).await.unwrap();
    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.opts, JobOptions::default());
}

#[tokio::test]
async fn add_rejects_bad_names() {
    let (service, _) = service();
    let err = service.add("not a name", json!(null), None).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(service.get_job_counts().await.unwrap().total, 0);
}

#[tokio::test]
async fn delayed_admission_counts_as_delayed() {
    let (service, _) = service();
    let opts = JobOptions { delay_ms: 60_000, ..JobOptions::default() };
    service.add("later", json!(null), Some(opts)).await.unwrap();
    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.delayed, 1);
    assert_eq!(counts.waiting, 0);
}

#[tokio::test]
async fn add_while_paused_parks_the_job() {
    let (service, _) = service();
    service.pause().await.unwrap();
    let id = service.add("x", json!(null), None).await.unwrap();
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().state, JobState::Paused);

    service.resume().await.unwrap();
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn add_bulk_is_best_effort() {
    let (service, _) = service();
    let result = service
        .add_bulk(vec![
            AddItem::new("ok-1", json!(1)),
            AddItem::new("bad name!", json!(2)),
            AddItem::new("ok-2", json!(3)),
        ])
        .await
        .unwrap();

    assert_eq!(result.added, 2);
    assert_eq!(result.job_ids.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);
    assert_eq!(service.get_job_counts().await.unwrap().total, 2);
}

#[tokio::test]
async fn empty_add_bulk_returns_zeroes() {
    let (service, _) = service();
    let result = service.add_bulk(Vec::new()).await.unwrap();
    assert_eq!(result, BulkResult::default());
}

#[tokio::test]
async fn get_job_unknown_is_none() {
    let (service, _) = service();
    assert!(service.get_job(&conveyor_core::JobId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn get_jobs_applies_filter_pipeline() {
    let (service, clock) = service();
    service.add("build", json!(1), None).await.unwrap();
    clock.advance(std::time::Duration::from_millis(10));
    service.add("deploy", json!(2), None).await.unwrap();
    clock.advance(std::time::Duration::from_millis(10));
    let failed_id = service.add("build", json!(3), None).await.unwrap();
    service.fail_job(&failed_id, "boom").unwrap();

    // Default order: newest first.
    let all = service.get_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].created_at_ms >= all[2].created_at_ms);

    let builds = service
        .get_jobs(JobFilter { name: Some("build".to_string()), ..JobFilter::default() })
        .await
        .unwrap();
    assert_eq!(builds.len(), 2);

    let waiting = service
        .get_jobs(JobFilter { states: Some(vec![JobState::Waiting]), ..JobFilter::default() })
        .await
        .unwrap();
    assert_eq!(waiting.len(), 2);

    let oldest_first = service
        .get_jobs(JobFilter { order: Some(SortOrder::Asc), ..JobFilter::default() })
        .await
        .unwrap();
    assert_eq!(oldest_first[0].name, "build");
    assert_eq!(oldest_first[1].name, "deploy");

    let page = service
        .get_jobs(JobFilter { start: Some(1), end: Some(2), ..JobFilter::default() })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn remove_job_reports_whether_anything_went() {
    let (service, _) = service();
    let id = service.add("x", json!(null), None).await.unwrap();
    assert!(service.remove_job(&id).await.unwrap());
    assert!(!service.remove_job(&id).await.unwrap());
    assert_eq!(service.get_job_counts().await.unwrap().waiting, 0);
    // The admission total is monotonic and survives removal.
    assert_eq!(service.get_job_counts().await.unwrap().total, 1);
}

#[tokio::test]
async fn update_progress_clamps_and_emits() {
    let (service, _) = service();
    let log = record_events(&service);
    let id = service.add("x", json!(null), None).await.unwrap();

    service.update_progress(&id, 250).unwrap();
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().progress, 100);

    service.update_progress(&id, -5).unwrap();
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().progress, 0);

    assert_eq!(
        *log.lock(),
        vec!["waiting".to_string(), "progress".to_string(), "progress".to_string()]
    );
}

#[tokio::test]
async fn update_progress_unknown_is_silent() {
    let (service, _) = service();
    let log = record_events(&service);
    service.update_progress(&conveyor_core::JobId::new("missing"), 50).unwrap();
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn process_job_settles_and_counts() {
    let (service, _) = service();
    let log = record_events(&service);
    let id = service.add("x", json!(null), None).await.unwrap();
    service.process_job(&id, json!({"score": 72})).unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(json!({"score": 72})));
    assert_eq!(service.get_job_counts().await.unwrap().completed, 1);
    assert_eq!(*log.lock(), vec!["waiting".to_string(), "completed".to_string()]);
}

#[tokio::test]
async fn fail_job_records_the_reason() {
    let (service, _) = service();
    let id = service.add("x", json!(null), None).await.unwrap();
    service.fail_job(&id, "broken pipe").unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.failed_reason.as_deref(), Some("broken pipe"));
}

#[tokio::test]
async fn process_unknown_job_is_a_state_error() {
    let (service, _) = service();
    let missing = conveyor_core::JobId::new("missing");
    assert!(service.process_job(&missing, json!(null)).is_err());
    assert!(service.fail_job(&missing, "x").is_err());
}

#[tokio::test]
async fn retry_job_mints_a_new_id() {
    let (service, _) = service();
    let opts = JobOptions { attempts: 5, priority: -2, ..JobOptions::default() };
    let id = service.add("flaky", json!({"n": 7}), Some(opts.clone())).await.unwrap();
    service.fail_job(&id, "boom").unwrap();

    let retry_id = service.retry_job(&id).await.unwrap();
    assert_ne!(retry_id, id);

    let retried = service.get_job(&retry_id).await.unwrap().unwrap();
    assert_eq!(retried.name, "flaky");
    assert_eq!(retried.payload, json!({"n": 7}));
    assert_eq!(retried.opts.attempts, 5);
    assert_eq!(retried.opts.priority, -2);
    assert_eq!(retried.state, JobState::Waiting);
    assert_eq!(retried.attempts_made, 0);

    // The original stays failed; no linkage is kept.
    assert_eq!(service.get_job(&id).await.unwrap().unwrap().state, JobState::Failed);
}

#[tokio::test]
async fn retry_requires_a_failed_job() {
    let (service, _) = service();
    let id = service.add("x", json!(null), None).await.unwrap();
    let err = service.retry_job(&id).await.unwrap_err();
    assert!(err.message.contains("cannot be retried"));
    assert!(service.retry_job(&conveyor_core::JobId::new("missing")).await.is_err());
}

// ── With a broker attached ──────────────────────────────────────────────

#[tokio::test]
async fn add_with_broker_shares_the_id() {
    let (service, broker, _) = service_with_broker();
    let id = service.add("x", json!(null), None).await.unwrap();
    let brokered = broker.get_job(&id).await.unwrap().unwrap();
    assert_eq!(brokered.id, id);
    assert_eq!(brokered.state, JobState::Waiting);
}

#[tokio::test]
async fn get_job_prefers_the_brokers_view() {
    let (service, broker, _) = service_with_broker();
    let id = service.add("x", json!(null), None).await.unwrap();

    // The broker claims the job; the local cache still says waiting.
    broker.claim().unwrap();
    let seen = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(seen.state, JobState::Active);
    assert_eq!(seen.attempts_made, 1);
}

#[tokio::test]
async fn counts_with_broker_are_broker_authoritative() {
    let (service, broker, _) = service_with_broker();
    service.add("a", json!(null), None).await.unwrap();
    service.add("b", json!(null), None).await.unwrap();
    broker.claim().unwrap();

    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.active, 1);
    assert_eq!(counts.total, 2);
}

#[tokio::test]
async fn bulk_admissions_count_individually_on_the_broker() {
    let (service, broker, _) = service_with_broker();
    let result = service
        .add_bulk(vec![AddItem::new("a", json!(1)), AddItem::new("b", json!(2))])
        .await
        .unwrap();
    assert_eq!(result.added, 2);
    let counts = broker.get_job_counts(&[JobState::Waiting]).await.unwrap();
    assert_eq!(counts[&JobState::Waiting], 2);
    assert_eq!(service.get_job_counts().await.unwrap().total, 2);
}

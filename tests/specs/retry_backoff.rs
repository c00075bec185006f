// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff: fail, wait, fail, wait longer, succeed.

use crate::util::{attach_driver, service_with_broker, wait_until};
use conveyor_core::{BackoffKind, BackoffStrategy, JobOptions, JobState, QueueError};
use conveyor_runtime::{processor_fn, WorkerConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

#[tokio::test]
async fn exponential_backoff_between_attempts() {
    let (service, broker) = service_with_broker("retries");

    // Fails twice, succeeds on the third attempt, recording attempt times.
    let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let attempts_in = Arc::clone(&attempts);
    let processor = processor_fn(move |_job| {
        let attempts = Arc::clone(&attempts_in);
        async move {
            let n = {
                let mut attempts = attempts.lock();
                attempts.push(Instant::now());
                attempts.len()
            };
            if n < 3 {
                Err(QueueError::external("transient failure"))
            } else {
                Ok(Value::Null)
            }
        }
    });

    let opts = JobOptions {
        attempts: 3,
        backoff: BackoffStrategy { kind: BackoffKind::Exponential, delay_ms: 100 },
        ..JobOptions::default()
    };
    let id = service.add("x", json!(null), Some(opts)).await.unwrap();

    let config = WorkerConfig::default();
    let worker = service.create_worker(processor, config).unwrap();
    attach_driver(&broker, &worker, &config);
    worker.start().await.unwrap();

    let attempts_in = Arc::clone(&attempts);
    wait_until(move || attempts_in.lock().len() == 3).await;
    worker.stop(false).await.unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts_made, 3);

    // Second attempt ≥100ms after the first; third ≥200ms after the second.
    // (Small margin for timer coarseness.)
    let attempts = attempts.lock();
    let first_gap = attempts[1].duration_since(attempts[0]).as_millis();
    let second_gap = attempts[2].duration_since(attempts[1]).as_millis();
    assert!(first_gap >= 90, "first retry came after {first_gap}ms");
    assert!(second_gap >= 180, "second retry came after {second_gap}ms");

    let stats = worker.get_stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 2);
}

#[tokio::test]
async fn single_attempt_jobs_never_retry() {
    let (service, broker) = service_with_broker("no-retries");

    let calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
    let calls_in = Arc::clone(&calls);
    let processor = processor_fn(move |_job| {
        let calls = Arc::clone(&calls_in);
        async move {
            *calls.lock() += 1;
            Err(QueueError::external("always fails"))
        }
    });

    let opts = JobOptions { attempts: 1, ..JobOptions::default() };
    let id = service.add("x", json!(null), Some(opts)).await.unwrap();

    let config = WorkerConfig::default();
    let worker = service.create_worker(processor, config).unwrap();
    attach_driver(&broker, &worker, &config);
    worker.start().await.unwrap();

    let calls_in = Arc::clone(&calls);
    wait_until(move || *calls_in.lock() >= 1).await;
    worker.stop(false).await.unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts_made, 1);
    assert_eq!(job.failed_reason.as_deref(), Some("always fails"));
    assert_eq!(*calls.lock(), 1);
}

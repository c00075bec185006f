// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One job through the whole pipeline: admit, claim, process, settle.

use crate::util::{attach_driver, record_job_events, service_with_broker, wait_until};
use conveyor_core::{JobOptions, JobState};
use conveyor_runtime::{processor_fn, WorkerConfig};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn single_job_happy_path() {
    let (service, broker) = service_with_broker("analysis");
    let events = record_job_events(&service);

    let opts = JobOptions { attempts: 2, ..JobOptions::default() };
    let id = service.add("analyse-repo", json!({"repo": "r1"}), Some(opts)).await.unwrap();

    let counts = service.get_job_counts().await.unwrap();
    assert_eq!(counts.waiting, 1);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.completed, 0);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.delayed, 0);
    assert_eq!(counts.paused, 0);
    assert_eq!(counts.total, 1);

    let config = WorkerConfig::default();
    let worker = service
        .create_worker(processor_fn(|_job| async { Ok(json!({"score": 72})) }), config)
        .unwrap();
    attach_driver(&broker, &worker, &config);
    worker.start().await.unwrap();

    let events_in = Arc::clone(&events);
    wait_until(move || events_in.lock().iter().any(|e| e == "completed")).await;
    // A graceful stop waits for the claim to settle broker-side.
    worker.stop(false).await.unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(json!({"score": 72})));
    assert_eq!(job.attempts_made, 1);

    assert_eq!(
        *events.lock(),
        vec!["waiting".to_string(), "active".to_string(), "completed".to_string()]
    );

    let stats = worker.get_stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 0);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful shutdown under load: in-flight jobs finish, waiting jobs stay.

use crate::util::{attach_driver, record_job_events, service_with_broker, wait_until};
use conveyor_broker::Broker;
use conveyor_core::JobState;
use conveyor_runtime::{processor_fn, ServiceStatus, ShutdownOptions, WorkerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn shutdown_under_load_keeps_waiting_jobs() {
    let (service, broker) = service_with_broker("loaded");
    let events = record_job_events(&service);

    for i in 0..10 {
        service.add(format!("job-{i}").as_str(), json!(null), None).await.unwrap();
    }

    let processor = processor_fn(|_job| async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(Value::Null)
    });
    let config = WorkerConfig { concurrency: 2, ..WorkerConfig::default() };
    let worker = service.create_worker(processor, config).unwrap();
    attach_driver(&broker, &worker, &config);
    worker.start().await.unwrap();

    // Both slots claimed, eight jobs still waiting.
    let events_in = Arc::clone(&events);
    wait_until(move || {
        events_in.lock().iter().filter(|e| e.as_str() == "active").count() == 2
    })
    .await;

    let options =
        ShutdownOptions { timeout_ms: 500, force_after_timeout: true, drain: false };
    service.shutdown(options).await.unwrap();
    assert_eq!(service.status(), ServiceStatus::Uninitialized);

    // The two in-flight jobs completed during the graceful window.
    let completed = events.lock().iter().filter(|e| e.as_str() == "completed").count();
    assert_eq!(completed, 2);

    // The waiting jobs were not drained; they remain with the broker.
    let counts = broker.get_job_counts(&JobState::ALL).await.unwrap();
    assert_eq!(counts[&JobState::Waiting], 8);
    assert_eq!(counts[&JobState::Completed], 2);
}

#[tokio::test]
async fn shutdown_is_idempotent_after_completion() {
    let (service, _) = service_with_broker("quiet");
    service.shutdown(ShutdownOptions::default()).await.unwrap();
    service.shutdown(ShutdownOptions::default()).await.unwrap();
    assert_eq!(service.status(), ServiceStatus::Uninitialized);
}

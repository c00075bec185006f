// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claim ordering: priority first, then age.

use crate::util::{attach_driver, service_with_broker, wait_until};
use conveyor_core::JobOptions;
use conveyor_runtime::{processor_fn, WorkerConfig};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn with_priority(priority: i32) -> JobOptions {
    JobOptions { priority, ..JobOptions::default() }
}

#[tokio::test]
async fn claims_follow_priority_order() {
    let (service, broker) = service_with_broker("prioritised");

    service.add("p5", json!(null), Some(with_priority(5))).await.unwrap();
    service.add("p1", json!(null), Some(with_priority(1))).await.unwrap();
    service.add("p3", json!(null), Some(with_priority(3))).await.unwrap();

    // The next three claims land in priority order, not insertion order.
    let order: Vec<String> =
        (0..3).filter_map(|_| broker.claim()).map(|job| job.name.to_string()).collect();
    assert_eq!(order, vec!["p1", "p3", "p5"]);
}

#[tokio::test]
async fn a_single_worker_processes_in_priority_order() {
    let (service, broker) = service_with_broker("prioritised-worker");

    let processed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let processed_in = Arc::clone(&processed);
    let processor = processor_fn(move |job: conveyor_core::Job| {
        let processed = Arc::clone(&processed_in);
        async move {
            processed.lock().push(job.name.to_string());
            Ok(Value::Null)
        }
    });

    service.add("low", json!(null), Some(with_priority(10))).await.unwrap();
    service.add("urgent", json!(null), Some(with_priority(-1))).await.unwrap();
    service.add("mid", json!(null), Some(with_priority(0))).await.unwrap();

    let config = WorkerConfig::default();
    let worker = service.create_worker(processor, config).unwrap();
    attach_driver(&broker, &worker, &config);
    worker.start().await.unwrap();

    let processed_in = Arc::clone(&processed);
    wait_until(move || processed_in.lock().len() == 3).await;
    worker.stop(false).await.unwrap();

    assert_eq!(*processed.lock(), vec!["urgent", "mid", "low"]);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario tests.

use conveyor_broker::{Broker, MemoryBroker, MemoryDriver, MemoryDriverConfig};
use conveyor_core::{QueueEvent, QueueEventKind};
use conveyor_runtime::{QueueService, Worker, WorkerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A service wired to a fresh in-memory broker.
pub fn service_with_broker(name: &str) -> (Arc<QueueService>, Arc<MemoryBroker>) {
    let service = Arc::new(QueueService::new(name).unwrap());
    let broker = Arc::new(MemoryBroker::new());
    service.set_broker(Arc::clone(&broker) as Arc<dyn Broker>);
    service.initialize().unwrap();
    (service, broker)
}

/// Wire a memory driver between a broker and a service-created worker.
pub fn attach_driver(broker: &Arc<MemoryBroker>, worker: &Arc<Worker>, config: &WorkerConfig) {
    let driver = MemoryDriver::new(
        Arc::clone(broker),
        worker.handler(),
        MemoryDriverConfig { concurrency: config.concurrency, rate_limit: config.rate_limit },
    );
    worker.set_broker_worker(Arc::new(driver));
}

/// Record the names of job lifecycle events in emission order.
pub fn record_job_events(service: &QueueService) -> Arc<Mutex<Vec<String>>> {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        QueueEventKind::Waiting,
        QueueEventKind::Active,
        QueueEventKind::Completed,
        QueueEventKind::Failed,
    ] {
        let log_in = Arc::clone(&log);
        service.on(kind, move |event: &QueueEvent| log_in.lock().push(event.name().to_string()));
    }
    log
}

/// Poll until `cond` holds, failing the test after ~5s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}

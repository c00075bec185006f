// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod jobs;
mod lifecycle;
mod maintenance;
mod tenant;

use super::*;
use conveyor_broker::MemoryBroker;
use conveyor_core::FakeClock;
use parking_lot::Mutex as PlMutex;
use serde_json::json;

fn service() -> (Arc<QueueService<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    let service = Arc::new(
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap(),
    );
    service.initialize().unwrap();
    (service, clock)
}

fn service_with_broker() -> (Arc<QueueService<FakeClock>>, Arc<MemoryBroker<FakeClock>>, FakeClock)
{
    let clock = FakeClock::new();
    let service = Arc::new(
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap(),
    );
    let broker = Arc::new(MemoryBroker::with_clock(clock.clone()));
    service.set_broker(Arc::clone(&broker) as Arc<dyn Broker>);
    service.initialize().unwrap();
    (service, broker, clock)
}

fn record_events(service: &QueueService<FakeClock>) -> Arc<PlMutex<Vec<String>>> {
    let log: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
    for kind in [
        QueueEventKind::Ready,
        QueueEventKind::Waiting,
        QueueEventKind::Active,
        QueueEventKind::Progress,
        QueueEventKind::Completed,
        QueueEventKind::Failed,
        QueueEventKind::Paused,
        QueueEventKind::Resumed,
        QueueEventKind::Drained,
        QueueEventKind::Cleaned,
    ] {
        let log_in = Arc::clone(&log);
        service.on(kind, move |event| log_in.lock().push(event.name().to_string()));
    }
    log
}

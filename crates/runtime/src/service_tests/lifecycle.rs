// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::scheduler::ScheduleConfig;
use crate::worker::{processor_fn, WorkerConfig};
use conveyor_core::JobState;
use std::time::Duration;

#[tokio::test]
async fn initialize_is_idempotent_and_emits_ready() {
    let clock = FakeClock::new();
    let service =
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap();
    let log = record_events(&service);

    service.initialize().unwrap();
    service.initialize().unwrap();
    assert_eq!(service.status(), ServiceStatus::Ready);
    assert_eq!(*log.lock(), vec!["ready".to_string()]);
}

#[tokio::test]
async fn operations_require_initialisation() {
    let clock = FakeClock::new();
    let service =
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap();

    let err = service.add("x", json!(null), None).await.unwrap_err();
    assert!(err.message.contains("not initialized"));
    assert!(service.get_jobs(JobFilter::default()).await.is_err());
    assert!(service.pause().await.is_err());
    assert!(service.add_schedule(ScheduleConfig::new("s", "every 1m")).is_err());
}

#[tokio::test]
async fn constructor_rejects_bad_queue_names() {
    assert!(QueueService::new("not a name").is_err());
    assert!(QueueService::new("").is_err());
}

#[tokio::test]
async fn health_check_reports_ready_state() {
    let (service, _) = service();
    let health = service.health_check().await;
    assert!(health.healthy);
    assert!(health.error.is_none());
}

#[tokio::test]
async fn health_check_never_raises_when_uninitialised() {
    let clock = FakeClock::new();
    let service =
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap();
    let health = service.health_check().await;
    assert!(!health.healthy);
    assert!(health.error.is_some());
}

#[tokio::test]
async fn health_check_surfaces_broker_failures() {
    let (service, broker, _) = service_with_broker();
    broker.close().await.unwrap();
    let health = service.health_check().await;
    assert!(!health.healthy);
    assert!(health.error.unwrap().contains("broker"));
}

#[tokio::test]
async fn shutdown_returns_to_uninitialised_and_is_idempotent() {
    let (service, _, _) = service_with_broker();
    service.add("x", json!(null), None).await.unwrap();

    service.shutdown(ShutdownOptions::default()).await.unwrap();
    assert_eq!(service.status(), ServiceStatus::Uninitialized);

    // Second shutdown is a no-op.
    service.shutdown(ShutdownOptions::default()).await.unwrap();

    // Operations fail until re-initialised; counters start over.
    assert!(service.add("x", json!(null), None).await.is_err());
    service.initialize().unwrap();
    assert_eq!(service.get_job_counts().await.unwrap().total, 0);
}

#[tokio::test]
async fn shutdown_stops_created_workers() {
    let (service, broker, _) = service_with_broker();
    let worker = service
        .create_worker(processor_fn(|_| async { Ok(json!(null)) }), WorkerConfig::default())
        .unwrap();
    let driver = conveyor_broker::MemoryDriver::new(
        Arc::clone(&broker),
        worker.handler(),
        conveyor_broker::MemoryDriverConfig::default(),
    );
    worker.set_broker_worker(Arc::new(driver));
    worker.start().await.unwrap();

    service.shutdown(ShutdownOptions::default()).await.unwrap();
    assert_eq!(worker.status(), crate::worker::WorkerStatus::Closed);
}

#[tokio::test]
async fn shutdown_with_drain_drops_waiting_jobs() {
    let (service, broker, _) = service_with_broker();
    service.add("x", json!(null), None).await.unwrap();

    let options = ShutdownOptions { drain: true, ..ShutdownOptions::default() };
    service.shutdown(options).await.unwrap();

    // Drained before the broker closed: nothing waiting remains.
    let counts = broker.get_job_counts(&[JobState::Waiting]).await.unwrap();
    assert_eq!(counts[&JobState::Waiting], 0);
}

/// Driver whose graceful close takes a long time; forced close is instant.
struct SlowCloseDriver {
    close_delay: Duration,
}

#[async_trait::async_trait]
impl conveyor_broker::BrokerDriver for SlowCloseDriver {
    async fn run(&self) -> Result<(), conveyor_core::QueueError> {
        Ok(())
    }

    async fn pause(&self, _do_not_wait_active: bool) -> Result<(), conveyor_core::QueueError> {
        Ok(())
    }

    async fn resume(&self) -> Result<(), conveyor_core::QueueError> {
        Ok(())
    }

    async fn close(&self, force: bool) -> Result<(), conveyor_core::QueueError> {
        if !force {
            tokio::time::sleep(self.close_delay).await;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        true
    }

    fn is_paused(&self) -> bool {
        false
    }
}

async fn service_with_slow_worker(
    close_delay: Duration,
) -> Arc<QueueService<FakeClock>> {
    let (service, _) = service();
    let worker = service
        .create_worker(processor_fn(|_| async { Ok(json!(null)) }), WorkerConfig::default())
        .unwrap();
    worker.set_broker_worker(Arc::new(SlowCloseDriver { close_delay }));
    worker.start().await.unwrap();
    service
}

#[tokio::test]
async fn initialize_during_shutdown_is_rejected() {
    let service = service_with_slow_worker(Duration::from_millis(300)).await;

    let service_in = Arc::clone(&service);
    let shutdown = tokio::spawn(async move {
        let options = ShutdownOptions { timeout_ms: 5_000, ..ShutdownOptions::default() };
        service_in.shutdown(options).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.status(), ServiceStatus::ShuttingDown);
    assert!(service.initialize().is_err());

    shutdown.await.unwrap().unwrap();
    assert_eq!(service.status(), ServiceStatus::Uninitialized);
}

#[tokio::test]
async fn shutdown_times_out_without_force() {
    let service = service_with_slow_worker(Duration::from_secs(30)).await;
    let options = ShutdownOptions { timeout_ms: 50, ..ShutdownOptions::default() };
    let err = service.shutdown(options).await.unwrap_err();
    assert!(err.message.contains("timed out"));
    assert_eq!(service.status(), ServiceStatus::ShuttingDown);
}

#[tokio::test]
async fn shutdown_forces_workers_after_timeout() {
    let service = service_with_slow_worker(Duration::from_secs(30)).await;
    let options = ShutdownOptions {
        timeout_ms: 50,
        force_after_timeout: true,
        ..ShutdownOptions::default()
    };
    service.shutdown(options).await.unwrap();
    assert_eq!(service.status(), ServiceStatus::Uninitialized);
}

#[tokio::test]
async fn schedules_materialise_as_submissions() {
    let (service, clock) = service();
    let mut config = ScheduleConfig::new("nightly-report", "every 1m");
    config.payload = json!({"kind": "report"});
    service.add_schedule(config).unwrap();

    assert!(service.run_due_schedules().await.unwrap().is_empty());

    clock.advance(Duration::from_secs(90));
    let fired = service.run_due_schedules().await.unwrap();
    assert_eq!(fired.len(), 1);

    let job = service.get_job(&fired[0]).await.unwrap().unwrap();
    assert_eq!(job.name, "nightly-report");
    assert_eq!(job.payload, json!({"kind": "report"}));

    let schedule = service.get_schedule("nightly-report").unwrap().unwrap();
    assert_eq!(schedule.execution_count, 1);
    assert!(schedule.next_run_at_ms.unwrap() > clock.epoch_ms());
}

#[tokio::test]
async fn remove_schedule_delegates() {
    let (service, _) = service();
    service.add_schedule(ScheduleConfig::new("s", "every 1m")).unwrap();
    assert!(service.remove_schedule("s").unwrap());
    assert!(!service.remove_schedule("s").unwrap());
    assert!(service.get_schedules().unwrap().is_empty());
}

#[tokio::test]
async fn create_worker_requires_ready() {
    let clock = FakeClock::new();
    let service =
        QueueService::with_clock("analysis", QueueConfig::default(), clock.clone()).unwrap();
    assert!(service
        .create_worker(processor_fn(|_| async { Ok(json!(null)) }), WorkerConfig::default())
        .is_err());
}

#[tokio::test]
async fn worker_events_fan_out_through_the_service() {
    let (service, _) = service();
    let log = record_events(&service);
    let worker = service
        .create_worker(processor_fn(|_| async { Ok(json!("ok")) }), WorkerConfig::default())
        .unwrap();

    let job = conveyor_core::JobBuilder::default().id("j1").name("fanout").build();
    worker.process_job(job).await.unwrap();
    assert_eq!(*log.lock(), vec!["active".to_string(), "completed".to_string()]);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_core::{FakeClock, JobBuilder, JobOptions};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

struct StubDriver {
    running: AtomicBool,
    paused: AtomicBool,
    fail_close: bool,
}

impl StubDriver {
    fn new() -> Arc<Self> {
        Arc::new(Self { running: AtomicBool::new(false), paused: AtomicBool::new(false), fail_close: false })
    }

    fn failing_close() -> Arc<Self> {
        Arc::new(Self { running: AtomicBool::new(false), paused: AtomicBool::new(false), fail_close: true })
    }
}

#[async_trait::async_trait]
impl BrokerDriver for StubDriver {
    async fn run(&self) -> Result<(), QueueError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self, _do_not_wait_active: bool) -> Result<(), QueueError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), QueueError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _force: bool) -> Result<(), QueueError> {
        if self.fail_close {
            return Err(QueueError::external("close failed"));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

fn ok_processor() -> Processor {
    processor_fn(|_job| async move { Ok(json!("done")) })
}

fn worker_with(processor: Processor) -> (Arc<Worker<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    (Arc::new(Worker::with_clock("analysis", processor, WorkerConfig::default(), clock.clone())), clock)
}

fn event_log(worker: &Worker<FakeClock>) -> Arc<parking_lot::Mutex<Vec<String>>> {
    let log: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for kind in [
        QueueEventKind::Active,
        QueueEventKind::Completed,
        QueueEventKind::Failed,
        QueueEventKind::Paused,
        QueueEventKind::Resumed,
    ] {
        let log_in = Arc::clone(&log);
        worker.on(kind, move |event| log_in.lock().push(event.name().to_string()));
    }
    log
}

#[tokio::test]
async fn process_job_success_path() {
    let (worker, _) = worker_with(ok_processor());
    let log = event_log(&worker);
    let job = JobBuilder::default().id("j1").name("analyse-repo").build();

    let result = worker.process_job(job).await.unwrap();
    assert_eq!(result, json!("done"));

    let stats = worker.get_stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.active_jobs, 0);
    assert_eq!(*log.lock(), vec!["active".to_string(), "completed".to_string()]);
}

#[tokio::test]
async fn process_job_failure_reraises() {
    let failing = processor_fn(|_job| async move { Err(QueueError::external("boom")) });
    let (worker, _) = worker_with(failing);
    let log = event_log(&worker);
    let job = JobBuilder::default().id("j1").build();

    let err = worker.process_job(job).await.unwrap_err();
    assert_eq!(err.message, "boom");

    let stats = worker.get_stats();
    assert_eq!(stats.total_processed, 0);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.active_jobs, 0);
    assert_eq!(*log.lock(), vec!["active".to_string(), "failed".to_string()]);
}

#[tokio::test]
async fn process_job_enforces_timeout() {
    let slow = processor_fn(|_job| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(json!("late"))
    });
    let (worker, _) = worker_with(slow);
    let opts = JobOptions { timeout_ms: 10, ..JobOptions::default() };
    let job = JobBuilder::default().id("j1").opts(opts).build();

    let err = worker.process_job(job).await.unwrap_err();
    assert!(err.message.contains("timed out"));
    assert_eq!(worker.get_stats().total_failed, 1);
}

#[tokio::test]
async fn avg_processing_time_is_window_mean() {
    let clock = FakeClock::new();
    let clock_in = clock.clone();
    let processor = processor_fn(move |job: Job| {
        let clock = clock_in.clone();
        async move {
            // The job payload tells us how long to pretend to run.
            let ms = job.payload["ms"].as_u64().unwrap_or(0);
            clock.advance(Duration::from_millis(ms));
            Ok(json!(null))
        }
    });
    let worker = Arc::new(Worker::with_clock("q", processor, WorkerConfig::default(), clock));

    for ms in [10u64, 20, 30] {
        let job = JobBuilder::default().id(format!("j{ms}")).payload(json!({"ms": ms})).build();
        worker.process_job(job).await.unwrap();
    }
    assert_eq!(worker.get_stats().avg_processing_time_ms, 20);
}

#[tokio::test]
async fn rolling_window_evicts_oldest() {
    let clock = FakeClock::new();
    let clock_in = clock.clone();
    let processor = processor_fn(move |job: Job| {
        let clock = clock_in.clone();
        async move {
            let ms = job.payload["ms"].as_u64().unwrap_or(0);
            clock.advance(Duration::from_millis(ms));
            Ok(json!(null))
        }
    });
    let worker =
        Arc::new(Worker::with_clock("q", processor, WorkerConfig::default(), clock.clone()));

    // One slow job, then a full window of instant ones pushes it out.
    let slow = JobBuilder::default().id("slow").payload(json!({"ms": 5000})).build();
    worker.process_job(slow).await.unwrap();
    assert_eq!(worker.get_stats().avg_processing_time_ms, 5000);

    for i in 0..ROLLING_WINDOW_SIZE {
        let job = JobBuilder::default().id(format!("fast{i}")).payload(json!({"ms": 0})).build();
        worker.process_job(job).await.unwrap();
    }
    assert_eq!(worker.get_stats().avg_processing_time_ms, 0);
}

#[tokio::test]
async fn jobs_per_second_uses_elapsed_wall_time() {
    let (worker, clock) = worker_with(ok_processor());
    worker.set_broker_worker(StubDriver::new());
    worker.start().await.unwrap();

    for i in 0..10 {
        let job = JobBuilder::default().id(format!("j{i}")).build();
        worker.process_job(job).await.unwrap();
    }
    clock.advance(Duration::from_secs(4));
    assert_eq!(worker.get_stats().jobs_per_second, 2.5);
}

#[tokio::test]
async fn start_requires_a_driver() {
    let (worker, _) = worker_with(ok_processor());
    let err = worker.start().await.unwrap_err();
    assert!(err.message.contains("no broker driver"));
    assert_eq!(worker.status(), WorkerStatus::Closed);
}

#[tokio::test]
async fn lifecycle_transitions() {
    let (worker, _) = worker_with(ok_processor());
    let driver = StubDriver::new();
    worker.set_broker_worker(Arc::clone(&driver) as Arc<dyn BrokerDriver>);
    let log = event_log(&worker);

    worker.start().await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Running);
    assert!(driver.is_running());

    worker.pause(true).await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Paused);
    assert!(driver.is_paused());

    worker.resume().await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Running);

    worker.stop(false).await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Closed);
    assert_eq!(
        *log.lock(),
        vec![
            "resumed".to_string(),
            "paused".to_string(),
            "resumed".to_string(),
        ]
    );
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (worker, _) = worker_with(ok_processor());
    worker.set_broker_worker(StubDriver::new());
    worker.start().await.unwrap();
    worker.stop(false).await.unwrap();
    worker.stop(false).await.unwrap();
    assert_eq!(worker.status(), WorkerStatus::Closed);
}

#[tokio::test]
async fn failed_stop_is_terminal() {
    let (worker, _) = worker_with(ok_processor());
    worker.set_broker_worker(StubDriver::failing_close());
    worker.start().await.unwrap();

    assert!(worker.stop(false).await.is_err());
    assert_eq!(worker.status(), WorkerStatus::Error);
    assert!(worker.start().await.is_err());
}

#[tokio::test]
async fn pause_while_closed_is_a_state_error() {
    let (worker, _) = worker_with(ok_processor());
    let err = worker.pause(true).await.unwrap_err();
    assert!(err.message.contains("cannot pause"));
}

#[tokio::test]
async fn listener_panic_does_not_break_processing() {
    let (worker, _) = worker_with(ok_processor());
    worker.on(QueueEventKind::Completed, |_| panic!("listener bug"));
    let job = JobBuilder::default().id("j1").build();
    assert!(worker.process_job(job).await.is_ok());
}

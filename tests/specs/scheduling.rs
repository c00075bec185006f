// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler firing: cron next-run computation, limits, materialisation.

use chrono::{TimeZone as _, Utc};
use conveyor_core::FakeClock;
use conveyor_runtime::{QueueConfig, QueueService, ScheduleConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> u64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp_millis() as u64
}

fn service_at(epoch_ms: u64) -> (Arc<QueueService<FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    clock.set_epoch_ms(epoch_ms);
    let service = Arc::new(
        QueueService::with_clock("scheduled", QueueConfig::default(), clock.clone()).unwrap(),
    );
    service.initialize().unwrap();
    (service, clock)
}

#[tokio::test]
async fn nightly_schedule_fires_at_midnight() {
    let (service, clock) = service_at(at(2026, 3, 1, 23, 59));

    let mut config = ScheduleConfig::new("nightly", "0 0 * * *");
    config.payload = json!({"kind": "report"});
    let schedule = service.add_schedule(config).unwrap();
    assert_eq!(schedule.next_run_at_ms, Some(at(2026, 3, 2, 0, 0)));

    // Not yet due.
    assert!(service.run_due_schedules().await.unwrap().is_empty());

    clock.set_epoch_ms(at(2026, 3, 2, 0, 0));
    let fired = service.run_due_schedules().await.unwrap();
    assert_eq!(fired.len(), 1);

    let job = service.get_job(&fired[0]).await.unwrap().unwrap();
    assert_eq!(job.name, "nightly");
    assert_eq!(job.payload, json!({"kind": "report"}));

    let schedule = service.get_schedule("nightly").unwrap().unwrap();
    assert_eq!(schedule.execution_count, 1);
    assert_eq!(schedule.next_run_at_ms, Some(at(2026, 3, 3, 0, 0)));
    assert_eq!(schedule.last_run_at_ms, Some(at(2026, 3, 2, 0, 0)));
}

#[tokio::test]
async fn limited_schedule_stops_after_three_firings() {
    let (service, clock) = service_at(at(2026, 3, 1, 12, 0));

    let mut config = ScheduleConfig::new("thrice", "every 1m");
    config.limit = Some(3);
    service.add_schedule(config).unwrap();

    for _ in 0..3 {
        clock.advance(Duration::from_secs(60));
        assert_eq!(service.run_due_schedules().await.unwrap().len(), 1);
    }

    let schedule = service.get_schedule("thrice").unwrap().unwrap();
    assert_eq!(schedule.execution_count, 3);
    assert!(!schedule.active);

    // Long after: nothing more fires.
    clock.advance(Duration::from_secs(3600));
    assert!(service.run_due_schedules().await.unwrap().is_empty());
    assert_eq!(service.get_job_counts().await.unwrap().total, 3);
}

#[tokio::test]
async fn unsupported_patterns_are_rejected_up_front() {
    let (service, _) = service_at(at(2026, 3, 1, 12, 0));
    assert!(service.add_schedule(ScheduleConfig::new("odd", "@reboot")).is_err());
    assert!(service.add_schedule(ScheduleConfig::new("odd", "0 0 * * * * *")).is_err());
    assert!(service.get_schedules().unwrap().is_empty());
}

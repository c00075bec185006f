// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conveyor-runtime: scheduler, workers, and the queue service façade.

pub mod cron;
pub mod global;
pub mod listeners;
pub mod pool;
pub mod scheduler;
pub mod service;
pub mod worker;

pub use cron::{patterns, CronExpr, SchedulePattern, Timezone};
pub use global::{get_or_create, get_or_create_with, reset};
pub use listeners::{Listener, ListenerRegistry, ListenerToken};
pub use pool::{AggregatedStats, DriverFactory, PoolStats, WorkerPool};
pub use scheduler::{Schedule, ScheduleConfig, ScheduleUpdate, Scheduler};
pub use service::{
    AddItem, BulkError, BulkResult, CleanupOptions, JobFilter, QueueConfig, QueueService,
    ServiceStatus, ShutdownOptions, TenantContext, TenantQueue,
};
pub use worker::{
    processor_fn, Processor, Worker, WorkerConfig, WorkerStats, WorkerStatus, ROLLING_WINDOW_SIZE,
};

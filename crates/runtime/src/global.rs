// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide queue service registry.
//!
//! A thin convenience over the first-class constructors: callers that want
//! multiple independent instances should construct [`QueueService`]
//! directly. The registry memoises one service per queue name.

use crate::service::{QueueConfig, QueueService};
use conveyor_core::QueueError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<QueueService>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<QueueService>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or lazily create the process-wide service for `name`.
pub fn get_or_create(name: &str) -> Result<Arc<QueueService>, QueueError> {
    get_or_create_with(name, QueueConfig::default())
}

/// As [`get_or_create`], with explicit config for first creation. The config
/// is ignored when the service already exists.
pub fn get_or_create_with(name: &str, config: QueueConfig) -> Result<Arc<QueueService>, QueueError> {
    let mut services = registry().lock();
    if let Some(service) = services.get(name) {
        return Ok(Arc::clone(service));
    }
    let service = Arc::new(QueueService::with_config(name, config)?);
    services.insert(name.to_string(), Arc::clone(&service));
    Ok(service)
}

/// Drop every memoised service (for tests). Existing handles keep working;
/// the next [`get_or_create`] builds a fresh instance.
pub fn reset() {
    registry().lock().clear();
}

#[cfg(test)]
#[path = "global_tests.rs"]
mod tests;

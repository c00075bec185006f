// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event listener registry with snapshot fan-out.

use conveyor_core::{QueueEvent, QueueEventKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A lifecycle event callback. May be registered from any thread; must not
/// block for long, since emission happens inline on the emitter's thread.
pub type Listener = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

/// Token returned by [`ListenerRegistry::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

#[derive(Default)]
struct RegistryInner {
    next_token: u64,
    listeners: HashMap<QueueEventKind, Vec<(ListenerToken, Listener)>>,
}

/// Registry mapping event kinds to listener sets.
///
/// Emission iterates a snapshot, so listeners may subscribe or unsubscribe
/// mid-fanout without affecting the current emission. Listener panics are
/// swallowed and do not reach other listeners or the emitter.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        kind: QueueEventKind,
        listener: impl Fn(&QueueEvent) + Send + Sync + 'static,
    ) -> ListenerToken {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = ListenerToken(inner.next_token);
        inner.listeners.entry(kind).or_default().push((token, Arc::new(listener)));
        token
    }

    /// Remove a listener. Returns whether it was still registered.
    pub fn off(&self, kind: QueueEventKind, token: ListenerToken) -> bool {
        let mut inner = self.inner.lock();
        match inner.listeners.get_mut(&kind) {
            Some(listeners) => {
                let before = listeners.len();
                listeners.retain(|(t, _)| *t != token);
                listeners.len() != before
            }
            None => false,
        }
    }

    pub fn emit(&self, event: &QueueEvent) {
        let snapshot: Vec<Listener> = {
            let inner = self.inner.lock();
            inner
                .listeners
                .get(&event.kind())
                .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = event.name(), "listener panicked during fan-out");
            }
        }
    }

    pub fn listener_count(&self, kind: QueueEventKind) -> usize {
        self.inner.lock().listeners.get(&kind).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "listeners_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue lifecycle events.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by the queue service and its workers.
///
/// Serializes with `{"type": "<name>", ...fields}` so embedders can ship
/// events to an external sink without an adapter layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueueEvent {
    /// Service initialised and accepting operations.
    Ready { queue: String },
    /// Job admitted and visible to workers.
    Waiting { id: JobId, name: String },
    /// Job claimed; processing started.
    Active { id: JobId, name: String },
    /// Progress update, already clamped to `0..=100`.
    Progress { id: JobId, progress: u8 },
    /// Processor returned successfully.
    Completed { id: JobId, name: String, result: Value },
    /// Processor raised (or timed out).
    Failed { id: JobId, name: String, error: String },
    /// Queue or worker paused.
    Paused { queue: String },
    /// Queue or worker resumed (also emitted on worker start).
    Resumed { queue: String },
    /// Waiting jobs dropped by a drain.
    Drained { queue: String, removed: u64 },
    /// Terminal jobs removed by a cleanup pass.
    Cleaned { queue: String, removed: u64 },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Ready { .. } => "ready",
            QueueEvent::Waiting { .. } => "waiting",
            QueueEvent::Active { .. } => "active",
            QueueEvent::Progress { .. } => "progress",
            QueueEvent::Completed { .. } => "completed",
            QueueEvent::Failed { .. } => "failed",
            QueueEvent::Paused { .. } => "paused",
            QueueEvent::Resumed { .. } => "resumed",
            QueueEvent::Drained { .. } => "drained",
            QueueEvent::Cleaned { .. } => "cleaned",
        }
    }

    pub fn kind(&self) -> QueueEventKind {
        QueueEventKind::from(self)
    }

    /// The job this event concerns, when it concerns one.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::Waiting { id, .. }
            | QueueEvent::Active { id, .. }
            | QueueEvent::Progress { id, .. }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Failed { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Tag-only variant of [`QueueEvent`], used as the listener registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEventKind {
    Ready,
    Waiting,
    Active,
    Progress,
    Completed,
    Failed,
    Paused,
    Resumed,
    Drained,
    Cleaned,
}

impl From<&QueueEvent> for QueueEventKind {
    fn from(e: &QueueEvent) -> Self {
        match e {
            QueueEvent::Ready { .. } => QueueEventKind::Ready,
            QueueEvent::Waiting { .. } => QueueEventKind::Waiting,
            QueueEvent::Active { .. } => QueueEventKind::Active,
            QueueEvent::Progress { .. } => QueueEventKind::Progress,
            QueueEvent::Completed { .. } => QueueEventKind::Completed,
            QueueEvent::Failed { .. } => QueueEventKind::Failed,
            QueueEvent::Paused { .. } => QueueEventKind::Paused,
            QueueEvent::Resumed { .. } => QueueEventKind::Resumed,
            QueueEvent::Drained { .. } => QueueEventKind::Drained,
            QueueEvent::Cleaned { .. } => QueueEventKind::Cleaned,
        }
    }
}

crate::simple_display! {
    QueueEventKind {
        Ready => "ready",
        Waiting => "waiting",
        Active => "active",
        Progress => "progress",
        Completed => "completed",
        Failed => "failed",
        Paused => "paused",
        Resumed => "resumed",
        Drained => "drained",
        Cleaned => "cleaned",
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

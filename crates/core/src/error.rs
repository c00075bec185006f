// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue domain error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine code carried by every [`QueueError`].
pub const ERROR_CODE: &str = "QUEUE_ERROR";

/// Broad failure category. The category decides retry and status mapping;
/// the detail lives in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad name, payload, options, or schedule pattern/window.
    Validation,
    /// Operation requires a lifecycle state that is not current.
    State,
    /// Job timeout, shutdown timeout, or next-run computation failure.
    Timeout,
    /// Broker or driver error surfaced from below.
    External,
}

crate::simple_display! {
    ErrorCategory {
        Validation => "validation",
        State => "state",
        Timeout => "timeout",
        External => "external",
    }
}

/// The single error kind raised by the queue runtime.
///
/// Carries a stable machine code ([`ERROR_CODE`]), a category, and a
/// human-readable message. Validation and state errors surface to the
/// caller and are never retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct QueueError {
    pub category: ErrorCategory,
    pub message: String,
}

impl QueueError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self { category: ErrorCategory::Validation, message: message.into() }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self { category: ErrorCategory::State, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { category: ErrorCategory::Timeout, message: message.into() }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self { category: ErrorCategory::External, message: message.into() }
    }

    /// Wrap an error from a broker or driver, preserving the original message.
    pub fn wrap_external(context: &str, source: &impl std::fmt::Display) -> Self {
        Self::external(format!("{context}: {source}"))
    }

    /// The stable machine code, identical for every category.
    pub fn code(&self) -> &'static str {
        ERROR_CODE
    }

    /// HTTP-equivalent status for façades that map errors onto a wire surface.
    pub fn http_status(&self) -> u16 {
        match self.category {
            ErrorCategory::Validation => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant namespacing via job-name prefixes.
//!
//! A tenant-scoped name has the form `tenant:<tenantId>:<name>`. Tenant ids
//! may not contain `:`, which makes the split lossless even though job names
//! themselves may contain further colons.

use crate::error::QueueError;

/// Prefix marking a tenant-scoped job name.
pub const TENANT_PREFIX: &str = "tenant:";

/// Validate a tenant id: name charset minus `:`, non-empty.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), QueueError> {
    if tenant_id.is_empty() {
        return Err(QueueError::validation("tenant id must not be empty"));
    }
    if let Some(c) = tenant_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(QueueError::validation(format!(
            "tenant id contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// `tenant:<tenantId>:<name>`. Total over validated inputs.
pub fn build_tenant_job_name(tenant_id: &str, name: &str) -> String {
    format!("{TENANT_PREFIX}{tenant_id}:{name}")
}

/// The tenant id of a scoped name, or `None` for unscoped names.
pub fn extract_tenant_id(name: &str) -> Option<&str> {
    let rest = name.strip_prefix(TENANT_PREFIX)?;
    let (tenant_id, _) = rest.split_once(':')?;
    if tenant_id.is_empty() {
        return None;
    }
    Some(tenant_id)
}

/// The original job name of a scoped name. Unscoped names pass through.
pub fn extract_job_name(name: &str) -> &str {
    match name.strip_prefix(TENANT_PREFIX).and_then(|rest| rest.split_once(':')) {
        Some((tenant_id, job_name)) if !tenant_id.is_empty() => job_name,
        _ => name,
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;

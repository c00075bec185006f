// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-scoped views over a queue service.
//!
//! A view prefixes submissions with `tenant:<id>:` and filters reads by
//! that prefix. Isolation is by namespacing only: service-level stats and
//! listings still see every tenant's jobs.

use super::jobs::{AddItem, BulkResult, JobFilter};
use super::QueueService;
use conveyor_core::{
    build_tenant_job_name, extract_tenant_id, paginate, validate_name, validate_tenant_id, Clock,
    Job, JobId, JobOptions, QueueError,
};
use serde_json::Value;
use std::sync::Arc;

/// Caller identity for [`QueueService::for_tenant`].
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into() }
    }
}

impl<C: Clock> QueueService<C> {
    /// A view of this queue scoped to one tenant. Tenant ids may not
    /// contain `:` so that scoped names split losslessly.
    pub fn for_tenant(self: &Arc<Self>, ctx: TenantContext) -> Result<TenantQueue<C>, QueueError> {
        validate_tenant_id(&ctx.tenant_id)?;
        Ok(TenantQueue { service: Arc::clone(self), tenant_id: ctx.tenant_id })
    }
}

/// Namespaced façade over one tenant's slice of a queue.
pub struct TenantQueue<C: Clock> {
    service: Arc<QueueService<C>>,
    tenant_id: String,
}

impl<C: Clock> TenantQueue<C> {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn scoped(&self, name: &str) -> Result<String, QueueError> {
        // Validate the bare name first so errors quote the caller's input.
        validate_name(name)?;
        Ok(build_tenant_job_name(&self.tenant_id, name))
    }

    pub async fn add(
        &self,
        name: &str,
        payload: Value,
        opts: Option<JobOptions>,
    ) -> Result<JobId, QueueError> {
        let scoped = self.scoped(name)?;
        self.service.add(&scoped, payload, opts).await
    }

    pub async fn add_bulk(&self, items: Vec<AddItem>) -> Result<BulkResult, QueueError> {
        let mut scoped_items = Vec::with_capacity(items.len());
        for item in items {
            // Leave invalid names to the service so the per-item error
            // shape matches an unscoped bulk admission.
            let name = match validate_name(&item.name) {
                Ok(()) => build_tenant_job_name(&self.tenant_id, &item.name),
                Err(_) => item.name,
            };
            scoped_items.push(AddItem { name, ..item });
        }
        self.service.add_bulk(scoped_items).await
    }

    /// The tenant's jobs only. A `name` filter matches the unscoped name.
    pub async fn get_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        let (start, end) = (filter.start, filter.end);
        let inner = JobFilter {
            states: filter.states,
            name: match filter.name {
                Some(name) => Some(self.scoped(&name)?),
                None => None,
            },
            start: None,
            end: None,
            order: filter.order,
        };
        let jobs = self.service.get_jobs(inner).await?;
        let mine: Vec<Job> = jobs
            .into_iter()
            .filter(|job| extract_tenant_id(&job.name) == Some(self.tenant_id.as_str()))
            .collect();
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(mine.len());
        Ok(paginate(&mine, start, end))
    }

    /// `None` for unknown ids and for jobs belonging to other tenants.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let job = self.service.get_job(id).await?;
        Ok(job.filter(|job| extract_tenant_id(&job.name) == Some(self.tenant_id.as_str())))
    }
}

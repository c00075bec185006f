// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant isolation through name prefixes.

use crate::util::service_with_broker;
use conveyor_core::{count_by_state, JobState};
use conveyor_runtime::{JobFilter, TenantContext};
use serde_json::json;

#[tokio::test]
async fn tenants_are_isolated_but_the_service_sees_all() {
    let (service, _) = service_with_broker("multi");
    let t1 = service.for_tenant(TenantContext::new("t1")).unwrap();
    let t2 = service.for_tenant(TenantContext::new("t2")).unwrap();

    let id = t1.add("ingest", json!({"source": "s3"}), None).await.unwrap();

    // The admitted job carries the scoped name.
    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.name, "tenant:t1:ingest");

    // The other tenant observes nothing.
    assert!(t2.get_jobs(JobFilter::default()).await.unwrap().is_empty());
    assert!(t2.get_job(&id).await.unwrap().is_none());

    // Service-level counts report both tenants' jobs.
    t2.add("ingest", json!({"source": "gcs"}), None).await.unwrap();
    let all = service.get_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(count_by_state(&all)[&JobState::Waiting], 2);
    assert_eq!(service.get_job_counts().await.unwrap().total, 2);
}

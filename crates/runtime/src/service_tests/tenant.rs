// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use conveyor_core::{count_by_state, JobState};

#[tokio::test]
async fn tenant_ids_are_validated() {
    let (service, _) = service();
    assert!(service.for_tenant(TenantContext::new("t1")).is_ok());
    assert!(service.for_tenant(TenantContext::new("a:b")).is_err());
    assert!(service.for_tenant(TenantContext::new("")).is_err());
}

#[tokio::test]
async fn tenant_add_prefixes_the_name() {
    let (service, _) = service();
    let tenant = service.for_tenant(TenantContext::new("t1")).unwrap();
    let id = tenant.add("ingest", json!({"n": 1}), None).await.unwrap();

    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.name, "tenant:t1:ingest");
}

#[tokio::test]
async fn tenants_do_not_observe_each_other() {
    let (service, _) = service();
    let t1 = service.for_tenant(TenantContext::new("t1")).unwrap();
    let t2 = service.for_tenant(TenantContext::new("t2")).unwrap();

    t1.add("ingest", json!(1), None).await.unwrap();
    t2.add("ingest", json!(2), None).await.unwrap();
    service.add("unscoped", json!(3), None).await.unwrap();

    let t1_jobs = t1.get_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(t1_jobs.len(), 1);
    assert_eq!(t1_jobs[0].name, "tenant:t1:ingest");

    let t2_jobs = t2.get_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(t2_jobs.len(), 1);
    assert_eq!(t2_jobs[0].name, "tenant:t2:ingest");
}

#[tokio::test]
async fn service_level_views_see_every_tenant() {
    let (service, _) = service();
    let t1 = service.for_tenant(TenantContext::new("t1")).unwrap();
    let t2 = service.for_tenant(TenantContext::new("t2")).unwrap();
    t1.add("ingest", json!(1), None).await.unwrap();
    t2.add("ingest", json!(2), None).await.unwrap();

    let all = service.get_jobs(JobFilter::default()).await.unwrap();
    let counts = count_by_state(&all);
    assert_eq!(counts[&JobState::Waiting], 2);
    assert_eq!(service.get_job_counts().await.unwrap().total, 2);
}

#[tokio::test]
async fn tenant_name_filter_uses_the_unscoped_name() {
    let (service, _) = service();
    let tenant = service.for_tenant(TenantContext::new("t1")).unwrap();
    tenant.add("ingest", json!(1), None).await.unwrap();
    tenant.add("export", json!(2), None).await.unwrap();

    let ingests = tenant
        .get_jobs(JobFilter { name: Some("ingest".to_string()), ..JobFilter::default() })
        .await
        .unwrap();
    assert_eq!(ingests.len(), 1);
    assert_eq!(ingests[0].name, "tenant:t1:ingest");
}

#[tokio::test]
async fn tenant_get_job_hides_foreign_jobs() {
    let (service, _) = service();
    let t1 = service.for_tenant(TenantContext::new("t1")).unwrap();
    let t2 = service.for_tenant(TenantContext::new("t2")).unwrap();
    let id = t1.add("ingest", json!(1), None).await.unwrap();

    assert!(t1.get_job(&id).await.unwrap().is_some());
    assert!(t2.get_job(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn tenant_add_bulk_prefixes_and_isolates_errors() {
    let (service, _) = service();
    let tenant = service.for_tenant(TenantContext::new("t1")).unwrap();
    let result = tenant
        .add_bulk(vec![
            AddItem::new("ok", json!(1)),
            AddItem::new("bad name!", json!(2)),
        ])
        .await
        .unwrap();

    assert_eq!(result.added, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);

    let jobs = tenant.get_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(jobs[0].name, "tenant:t1:ok");
}

#[tokio::test]
async fn scoped_names_round_trip() {
    let (service, _) = service();
    let tenant = service.for_tenant(TenantContext::new("acme")).unwrap();
    let id = tenant.add("etl:load", json!(null), None).await.unwrap();
    let job = service.get_job(&id).await.unwrap().unwrap();
    assert_eq!(conveyor_core::extract_tenant_id(&job.name), Some("acme"));
    assert_eq!(conveyor_core::extract_job_name(&job.name), "etl:load");
}

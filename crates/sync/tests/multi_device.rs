//! Black-box multi-device scenario: two worker devices sharing one remote.

use std::sync::Arc;
use std::time::Duration;

use fieldtrack_core::{JobStatus, SubscriptionScope, UserId};
use fieldtrack_replica::{AppContext, JobFilter, ReplicaConfig};
use fieldtrack_session::InMemoryIdentity;
use fieldtrack_sync::{InMemoryRemote, SyncWorker};

fn device(remote: &Arc<InMemoryRemote>, user: UserId) -> AppContext {
    fieldtrack_observability::init();
    let context = AppContext::with_config(
        remote.clone(),
        Arc::new(InMemoryIdentity::logged_in(user)),
        ReplicaConfig {
            ensure_timeout: Duration::from_secs(2),
        },
    );
    remote.attach(context.store().clone());
    context
}

#[tokio::test]
async fn local_commit_propagates_to_the_other_device() {
    let remote = InMemoryRemote::arc();
    let worker_a = UserId::new();
    let worker_b = UserId::new();

    let device_a = device(&remote, worker_a);
    let device_b = device(&remote, worker_b);
    device_a.ensure_default_subscriptions().await.unwrap();
    device_b.ensure_default_subscriptions().await.unwrap();

    // B keeps a live view of the unassigned backlog.
    let mut backlog_b = device_b
        .queries()
        .watch(JobFilter::with_status(JobStatus::Unassigned));
    assert!(backlog_b.next().await.unwrap().is_empty());

    // A seeds a location and a job; its outbound queue drains to the remote,
    // which delivers to B.
    let location = device_a.writer().create_location("Dallas").unwrap();
    let job = device_a.writer().create_job("Fix pump", location.id).unwrap();

    let worker = SyncWorker::new(device_a.outbound().clone(), remote.clone());
    let (synced, failed) = worker.drain_once().await;
    assert_eq!(failed, 0);
    assert_eq!(synced, 2);

    let seen_by_b = backlog_b.next().await.unwrap();
    assert_eq!(seen_by_b.len(), 1);
    assert_eq!(seen_by_b[0].id, job.id);

    // A claims the job; after propagation B's backlog view empties and B's
    // replica shows A as owner.
    device_a
        .writer()
        .try_transition(job.id, JobStatus::Unassigned, JobStatus::Accepted)
        .unwrap();
    let (synced, failed) = worker.drain_once().await;
    assert_eq!((synced, failed), (1, 0));

    assert!(backlog_b.next().await.unwrap().is_empty());
    assert_eq!(device_b.store().get_job(job.id).unwrap().owner, Some(worker_a));

    // B's stale claim fails locally with the expected conflict.
    let err = device_b
        .writer()
        .try_transition(job.id, JobStatus::Unassigned, JobStatus::Accepted)
        .unwrap_err();
    assert!(err.is_already_taken());
}

#[tokio::test]
async fn remote_origin_changes_flow_into_scoped_subscriptions() {
    let remote = InMemoryRemote::arc();
    let worker = UserId::new();

    let context = device(&remote, worker);
    context.ensure_default_subscriptions().await.unwrap();

    // An admin process creates work directly on the remote.
    let location = fieldtrack_core::Location::new(fieldtrack_core::LocationId::new(), "Houston");
    remote.put_location(location.clone());
    let job = fieldtrack_core::Job::unassigned(
        fieldtrack_core::JobId::new(),
        "Inspect valve",
        location.id,
        chrono::Utc::now(),
    );
    remote.put_job(job.clone());

    assert_eq!(context.store().get_job(job.id), Some(job.clone()));

    // Narrowing the job subscription to another location evicts the record
    // locally while the remote keeps it.
    let elsewhere = fieldtrack_core::LocationId::new();
    context
        .subscriptions()
        .ensure("jobs", SubscriptionScope::JobsInLocation(elsewhere))
        .await
        .unwrap();

    assert_eq!(context.store().get_job(job.id), None);
    assert!(remote.job(job.id).is_some());
}

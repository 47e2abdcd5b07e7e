//! In-memory remote for dev/tests.
//!
//! Plays the part of the external sync service: it owns the authoritative
//! dataset, answers subscription activations with full initial batches,
//! accepts pushed mutations, and delivers every accepted change to each
//! attached replica store (the inbound half of multi-device sync). Local
//! stores tolerate the echo of their own writes because identical upserts
//! are silent.
//!
//! Conflict handling here is plain last-write-wins; the assignment race is
//! resolved by each device's local compare-and-swap, not by this stub.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use fieldtrack_core::{
    DomainError, DomainResult, Job, JobId, Location, SubscriptionScope, UserProfile,
};
use fieldtrack_replica::{EntityStore, Mutation, OutboundMutation, RemoteBatch, SyncConnector};

#[derive(Debug, Default)]
struct RemoteData {
    jobs: Vec<Job>,
    locations: Vec<Location>,
    profiles: Vec<UserProfile>,
}

impl RemoteData {
    fn upsert_job(&mut self, job: Job) {
        match self.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => self.jobs.push(job),
        }
    }

    fn upsert_location(&mut self, location: Location) {
        match self.locations.iter_mut().find(|l| l.id == location.id) {
            Some(existing) => *existing = location,
            None => self.locations.push(location),
        }
    }

    fn upsert_profile(&mut self, profile: UserProfile) {
        match self.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }
}

/// Simulated remote sync service.
#[derive(Default)]
pub struct InMemoryRemote {
    data: Mutex<RemoteData>,
    replicas: Mutex<Vec<Arc<EntityStore>>>,
    fail_pushes: AtomicBool,
    pushes: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a device's local store to receive delivered changes.
    pub fn attach(&self, store: Arc<EntityStore>) {
        self.replicas.lock().unwrap().push(store);
    }

    /// Remote-origin job change (e.g. another device, or the admin seed):
    /// update the authoritative dataset and deliver to every replica.
    pub fn put_job(&self, job: Job) {
        self.data.lock().unwrap().upsert_job(job.clone());
        self.deliver(Mutation::PutJob(job));
    }

    pub fn put_location(&self, location: Location) {
        self.data.lock().unwrap().upsert_location(location.clone());
        self.deliver(Mutation::PutLocation(location));
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.data.lock().unwrap().upsert_profile(profile.clone());
        self.deliver(Mutation::PutProfile(profile));
    }

    /// Remote-origin removal.
    pub fn remove_job(&self, job_id: JobId) {
        self.data.lock().unwrap().jobs.retain(|j| j.id != job_id);
        self.deliver(Mutation::RemoveJob(job_id));
    }

    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.data
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.data.lock().unwrap().jobs.clone()
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Make subsequent pushes fail with a retryable error (simulated
    /// outage).
    pub fn set_push_failure(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    fn deliver(&self, mutation: Mutation) {
        let replicas = self.replicas.lock().unwrap().clone();
        for store in replicas {
            // A replica that never held the record reports NotFound on
            // removal; that device simply was not subscribed to it.
            match store.apply(mutation.clone()) {
                Ok(_) => {}
                Err(DomainError::NotFound) => {}
                Err(err) => {
                    tracing::warn!(%err, "replica rejected delivered change");
                }
            }
        }
    }

    fn apply_push(&self, mutation: &OutboundMutation) -> DomainResult<Mutation> {
        let applied = if mutation.kind.starts_with("job.") {
            let job: Job = decode_record(mutation)?;
            self.data.lock().unwrap().upsert_job(job.clone());
            Mutation::PutJob(job)
        } else if mutation.kind.starts_with("location.") {
            let location: Location = decode_record(mutation)?;
            self.data.lock().unwrap().upsert_location(location.clone());
            Mutation::PutLocation(location)
        } else if mutation.kind.starts_with("profile.") {
            let profile: UserProfile = decode_record(mutation)?;
            self.data.lock().unwrap().upsert_profile(profile.clone());
            Mutation::PutProfile(profile)
        } else {
            return Err(DomainError::validation(format!(
                "unknown outbound mutation kind: {}",
                mutation.kind
            )));
        };
        Ok(applied)
    }
}

#[async_trait]
impl SyncConnector for InMemoryRemote {
    async fn activate(&self, scope: &SubscriptionScope) -> DomainResult<RemoteBatch> {
        let data = self.data.lock().unwrap();
        let batch = match scope {
            SubscriptionScope::AllJobs => RemoteBatch {
                jobs: data.jobs.clone(),
                ..RemoteBatch::default()
            },
            SubscriptionScope::JobsInLocation(location) => RemoteBatch {
                jobs: data
                    .jobs
                    .iter()
                    .filter(|j| j.location == *location)
                    .cloned()
                    .collect(),
                ..RemoteBatch::default()
            },
            SubscriptionScope::AllLocations => RemoteBatch {
                locations: data.locations.clone(),
                ..RemoteBatch::default()
            },
            SubscriptionScope::Profile(user) => RemoteBatch {
                profiles: data
                    .profiles
                    .iter()
                    .filter(|p| p.id == *user)
                    .cloned()
                    .collect(),
                ..RemoteBatch::default()
            },
        };
        Ok(batch)
    }

    async fn push(&self, mutation: &OutboundMutation) -> DomainResult<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(DomainError::Timeout);
        }

        let delivered = self.apply_push(mutation)?;
        self.deliver(delivered);
        Ok(())
    }
}

fn decode_record<T: DeserializeOwned>(mutation: &OutboundMutation) -> DomainResult<T> {
    decode_record_inner(mutation)
        .map_err(|err| DomainError::validation(format!("bad outbound payload: {err:#}")))
}

fn decode_record_inner<T: DeserializeOwned>(mutation: &OutboundMutation) -> anyhow::Result<T> {
    let record = mutation
        .payload
        .get("record")
        .with_context(|| format!("payload of {} has no record", mutation.kind))?;
    serde_json::from_value(record.clone())
        .with_context(|| format!("record of {} does not decode", mutation.kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fieldtrack_core::{JobStatus, LocationId, UserId};
    use serde_json::json;

    fn remote_with_jobs() -> (Arc<InMemoryRemote>, LocationId, LocationId) {
        let remote = InMemoryRemote::arc();
        let dallas = LocationId::new();
        let miami = LocationId::new();
        remote.put_location(Location::new(dallas, "Dallas"));
        remote.put_location(Location::new(miami, "Miami"));
        remote.put_job(Job::unassigned(JobId::new(), "Fix pump", dallas, Utc::now()));
        remote.put_job(Job::unassigned(JobId::new(), "Check meter", miami, Utc::now()));
        (remote, dallas, miami)
    }

    #[tokio::test]
    async fn activation_returns_only_the_scoped_records() {
        let (remote, dallas, _) = remote_with_jobs();

        let all = remote.activate(&SubscriptionScope::AllJobs).await.unwrap();
        assert_eq!(all.jobs.len(), 2);
        assert!(all.locations.is_empty());

        let narrowed = remote
            .activate(&SubscriptionScope::JobsInLocation(dallas))
            .await
            .unwrap();
        assert_eq!(narrowed.jobs.len(), 1);
        assert_eq!(narrowed.jobs[0].location, dallas);

        let locations = remote
            .activate(&SubscriptionScope::AllLocations)
            .await
            .unwrap();
        assert_eq!(locations.locations.len(), 2);
    }

    #[tokio::test]
    async fn delivered_changes_reach_attached_replicas() {
        let (remote, dallas, _) = remote_with_jobs();
        let store = Arc::new(EntityStore::new());
        remote.attach(store.clone());

        let job = Job::unassigned(JobId::new(), "Replace filter", dallas, Utc::now());
        remote.put_job(job.clone());

        assert_eq!(store.get_job(job.id), Some(job));
    }

    #[tokio::test]
    async fn pushed_transition_updates_the_remote_and_other_replicas() {
        let (remote, dallas, _) = remote_with_jobs();
        let other_device = Arc::new(EntityStore::new());
        remote.attach(other_device.clone());

        let worker = UserId::new();
        let mut job = Job::unassigned(JobId::new(), "Patch roof", dallas, Utc::now());
        remote.put_job(job.clone());

        job.status = JobStatus::Accepted;
        job.owner = Some(worker);
        let mutation = OutboundMutation {
            id: uuid::Uuid::now_v7(),
            kind: "job.transition".to_string(),
            record: fieldtrack_replica::RecordRef::Job(job.id),
            payload: json!({
                "from": JobStatus::Unassigned,
                "to": JobStatus::Accepted,
                "record": serde_json::to_value(&job).unwrap(),
            }),
            status: fieldtrack_replica::OutboundStatus::Pending,
            created_at: Utc::now(),
            synced_at: None,
            error: None,
        };

        remote.push(&mutation).await.unwrap();

        assert_eq!(remote.job(job.id).unwrap().owner, Some(worker));
        assert_eq!(other_device.get_job(job.id).unwrap().owner, Some(worker));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let remote = InMemoryRemote::arc();
        let mutation = OutboundMutation {
            id: uuid::Uuid::now_v7(),
            kind: "job.transition".to_string(),
            record: fieldtrack_replica::RecordRef::Job(JobId::new()),
            payload: json!({ "no_record": true }),
            status: fieldtrack_replica::OutboundStatus::Pending,
            created_at: Utc::now(),
            synced_at: None,
            error: None,
        };

        let err = remote.push(&mutation).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}

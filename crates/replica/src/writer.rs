//! The write path.
//!
//! Local writes commit against the store first (so they appear instantly to
//! live views), then queue for remote propagation. Propagation is
//! fire-and-forget from here: the background sync worker owns delivery and
//! retries.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use fieldtrack_core::{
    DomainError, DomainResult, Job, JobId, JobStatus, Location, LocationId, UserId, UserProfile,
};
use fieldtrack_session::Session;

use crate::change::RecordRef;
use crate::outbound::OutboundQueue;
use crate::store::{EntityStore, Mutation};

/// Demo location set used by the one-time seed.
pub const DEMO_LOCATIONS: [&str; 7] = [
    "New York",
    "Los Angeles",
    "Chicago",
    "Miami",
    "Dallas",
    "Houston",
    "Philadelphia",
];

/// Applies local writes and queues them for propagation.
#[derive(Clone)]
pub struct JobWriter {
    store: Arc<EntityStore>,
    session: Session,
    outbound: Arc<OutboundQueue>,
}

impl JobWriter {
    pub fn new(store: Arc<EntityStore>, session: Session, outbound: Arc<OutboundQueue>) -> Self {
        Self {
            store,
            session,
            outbound,
        }
    }

    /// Atomically move a job from `expected` to `to`, acting as the current
    /// user.
    ///
    /// [`DomainError::StatusChanged`] is an expected outcome under
    /// contention: someone else took (or released) the job first. Refresh
    /// the record and decide again with the new status; do not retry
    /// blindly.
    pub fn try_transition(
        &self,
        job_id: JobId,
        expected: JobStatus,
        to: JobStatus,
    ) -> DomainResult<Job> {
        let actor = self.session.require_user()?;
        self.try_transition_as(job_id, expected, to, actor)
    }

    /// Identity-explicit variant of [`JobWriter::try_transition`], for
    /// embedders that manage identity themselves.
    pub fn try_transition_as(
        &self,
        job_id: JobId,
        expected: JobStatus,
        to: JobStatus,
        actor: UserId,
    ) -> DomainResult<Job> {
        let job = self.store.transition_job(job_id, expected, to, actor)?;

        tracing::info!(%job_id, from = %expected, to = %job.status, %actor, "job transition committed");
        self.outbound.enqueue(
            "job.transition",
            RecordRef::Job(job_id),
            json!({
                "from": expected,
                "to": job.status,
                "record": payload_of(&job),
            }),
        );

        Ok(job)
    }

    /// Plain write used by the seed/admin collaborator. Jobs always start
    /// unassigned.
    pub fn create_job(
        &self,
        description: impl Into<String>,
        location: LocationId,
    ) -> DomainResult<Job> {
        let description = description.into();
        if description.is_empty() {
            return Err(DomainError::validation("job description is required"));
        }
        if self.store.get_location(location).is_none() {
            return Err(DomainError::NotFound);
        }

        let job = Job::unassigned(JobId::new(), description, location, Utc::now());
        self.store.apply(Mutation::PutJob(job.clone()))?;
        self.outbound.enqueue(
            "job.create",
            RecordRef::Job(job.id),
            json!({ "record": payload_of(&job) }),
        );
        Ok(job)
    }

    /// Plain write used by the seed/admin collaborator.
    pub fn create_location(&self, name: impl Into<String>) -> DomainResult<Location> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("location name is required"));
        }

        let location = Location::new(LocationId::new(), name);
        self.store.apply(Mutation::PutLocation(location.clone()))?;
        self.outbound.enqueue(
            "location.create",
            RecordRef::Location(location.id),
            json!({ "record": payload_of(&location) }),
        );
        Ok(location)
    }

    /// Create the profile row for a freshly registered identity
    /// (last-write-wins; re-registration of the same id is an upsert).
    pub fn register_profile(
        &self,
        user_id: UserId,
        email: impl Into<String>,
    ) -> DomainResult<UserProfile> {
        let profile = UserProfile::registered(user_id, email);
        self.store.apply(Mutation::PutProfile(profile.clone()))?;
        self.outbound.enqueue(
            "profile.register",
            RecordRef::Profile(user_id),
            json!({ "record": payload_of(&profile) }),
        );
        Ok(profile)
    }

    /// Profile edit for the current user (last-write-wins).
    pub fn save_profile(
        &self,
        display_name: impl Into<String>,
        contact_number: Option<String>,
    ) -> DomainResult<UserProfile> {
        let user_id = self.session.require_user()?;
        let profile = self
            .store
            .get_profile(user_id)
            .ok_or(DomainError::NotFound)?
            .edited(display_name, contact_number);

        self.store.apply(Mutation::PutProfile(profile.clone()))?;
        self.outbound.enqueue(
            "profile.save",
            RecordRef::Profile(user_id),
            json!({ "record": payload_of(&profile) }),
        );
        Ok(profile)
    }

    /// One-time demo data population: the canonical location set plus a
    /// single unassigned job at the first location. Skips locations that
    /// already exist, so re-running is harmless.
    pub fn seed_demo_data(&self) -> DomainResult<()> {
        let existing: Vec<String> = self
            .store
            .locations()
            .into_iter()
            .map(|l| l.name)
            .collect();

        let mut first = None;
        for name in DEMO_LOCATIONS {
            if existing.iter().any(|n| n == name) {
                continue;
            }
            let location = self.create_location(name)?;
            first.get_or_insert(location.id);
        }

        if let Some(location) = first {
            self.create_job("Random Job", location)?;
        }

        Ok(())
    }
}

fn payload_of<T: Serialize>(record: &T) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or_else(|err| {
        // Propagation is fire-and-forget; a malformed payload is the sync
        // layer's problem to report, not a reason to fail the local commit.
        tracing::warn!(%err, "failed to serialize outbound payload");
        serde_json::Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldtrack_session::{InMemoryIdentity, Session};

    use crate::outbound::OutboundStatus;

    fn setup_logged_in() -> (Arc<EntityStore>, Arc<OutboundQueue>, JobWriter, UserId) {
        let user_id = UserId::new();
        let store = Arc::new(EntityStore::new());
        let outbound = Arc::new(OutboundQueue::new());
        let session = Session::new(Arc::new(InMemoryIdentity::logged_in(user_id)));
        let writer = JobWriter::new(store.clone(), session, outbound.clone());
        (store, outbound, writer, user_id)
    }

    #[test]
    fn transition_requires_a_session() {
        let store = Arc::new(EntityStore::new());
        let outbound = Arc::new(OutboundQueue::new());
        let session = Session::new(Arc::new(InMemoryIdentity::new()));
        let writer = JobWriter::new(store, session, outbound);

        let err = writer
            .try_transition(JobId::new(), JobStatus::Unassigned, JobStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, DomainError::Auth(_)));
    }

    #[test]
    fn committed_transition_is_queued_for_propagation() {
        let (store, outbound, writer, user_id) = setup_logged_in();
        let location = writer.create_location("Dallas").unwrap();
        let job = writer.create_job("Fix pump", location.id).unwrap();

        let updated = writer
            .try_transition(job.id, JobStatus::Unassigned, JobStatus::Accepted)
            .unwrap();
        assert_eq!(updated.owner, Some(user_id));
        assert_eq!(store.get_job(job.id), Some(updated));

        let pending = outbound.list_pending();
        let kinds: Vec<&str> = pending.iter().map(|m| m.kind.as_str()).collect();
        assert_eq!(kinds, vec!["location.create", "job.create", "job.transition"]);
        assert!(pending.iter().all(|m| m.status == OutboundStatus::Pending));
    }

    #[test]
    fn failed_transition_queues_nothing() {
        let (_, outbound, writer, _) = setup_logged_in();
        let location = writer.create_location("Dallas").unwrap();
        let job = writer.create_job("Fix pump", location.id).unwrap();
        let queued_before = outbound.len();

        let err = writer
            .try_transition(job.id, JobStatus::Accepted, JobStatus::Done)
            .unwrap_err();
        assert!(err.is_already_taken());
        assert_eq!(outbound.len(), queued_before);
    }

    #[test]
    fn create_job_rejects_unknown_locations() {
        let (_, _, writer, _) = setup_logged_in();
        let err = writer.create_job("Fix pump", LocationId::new()).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn save_profile_round_trips() {
        let (store, _, writer, user_id) = setup_logged_in();
        writer.register_profile(user_id, "worker@example.com").unwrap();

        let saved = writer
            .save_profile("Jo Field", Some("555-0100".to_string()))
            .unwrap();
        assert_eq!(saved.display_name, "Jo Field");
        assert_eq!(store.get_profile(user_id), Some(saved));
    }

    #[test]
    fn seed_is_idempotent() {
        let (store, _, writer, _) = setup_logged_in();
        writer.seed_demo_data().unwrap();
        let locations = store.locations().len();
        let jobs = store.jobs().len();
        assert_eq!(locations, DEMO_LOCATIONS.len());
        assert_eq!(jobs, 1);

        writer.seed_demo_data().unwrap();
        assert_eq!(store.locations().len(), locations);
        assert_eq!(store.jobs().len(), jobs);
    }
}

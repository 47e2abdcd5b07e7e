//! The local replica: single source of truth for reads.
//!
//! One process-wide store holds every replicated record. `apply` is
//! linearizable per record: a single write lock covers the whole
//! read-check-write of a conditional transition, so concurrent claims of the
//! same job serialize and exactly one wins. Change events are published
//! after the lock is released, i.e. after the mutation is visible to
//! subsequent reads.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use fieldtrack_core::{
    DomainError, DomainResult, Job, JobId, JobStatus, Location, LocationId, SubscriptionScope,
    UserId, UserProfile,
};

use crate::change::{ChangeEvent, ChangeKind, RecordRef};

/// Buffered change events per subscriber before lagging kicks in. Lagged
/// subscribers resynchronize by re-reading the store.
const CHANGE_BUFFER: usize = 256;

/// A write against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Last-write-wins upsert (seed/admin create, profile save, and every
    /// record delivered by the sync layer). Re-applying an identical record
    /// is a no-op and emits no event.
    PutJob(Job),
    PutLocation(Location),
    PutProfile(UserProfile),
    /// Conditional job-assignment transition (compare-and-swap on status).
    TransitionJob {
        job_id: JobId,
        expected: JobStatus,
        to: JobStatus,
        actor: UserId,
    },
    /// Remote-origin removal delivered by the sync layer.
    RemoveJob(JobId),
}

/// What a successful `apply` did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Job(Job),
    Location(Location),
    Profile(UserProfile),
    Removed(JobId),
    /// Idempotent upsert of an identical record; nothing changed, no event.
    Unchanged,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    job_order: Vec<JobId>,
    locations: HashMap<LocationId, Location>,
    location_order: Vec<LocationId>,
    profiles: HashMap<UserId, UserProfile>,
    profile_order: Vec<UserId>,
}

/// In-memory replicated entity store.
#[derive(Debug)]
pub struct EntityStore {
    inner: RwLock<Inner>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl EntityStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: RwLock::new(Inner::default()),
            changes,
        }
    }

    /// Subscribe to store changes. Events published before this call are not
    /// replayed; subscribe first, then read the current state.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.inner.read().unwrap().jobs.get(&id).cloned()
    }

    pub fn get_location(&self, id: LocationId) -> Option<Location> {
        self.inner.read().unwrap().locations.get(&id).cloned()
    }

    pub fn get_profile(&self, id: UserId) -> Option<UserProfile> {
        self.inner.read().unwrap().profiles.get(&id).cloned()
    }

    /// All jobs in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        let inner = self.inner.read().unwrap();
        inner
            .job_order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Jobs satisfying `pred`, in insertion order.
    pub fn jobs_matching(&self, pred: impl Fn(&Job) -> bool) -> Vec<Job> {
        let inner = self.inner.read().unwrap();
        inner
            .job_order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| pred(job))
            .cloned()
            .collect()
    }

    /// All locations in insertion order.
    pub fn locations(&self) -> Vec<Location> {
        let inner = self.inner.read().unwrap();
        inner
            .location_order
            .iter()
            .filter_map(|id| inner.locations.get(id).cloned())
            .collect()
    }

    /// Apply a mutation. Exactly one change event is emitted per affected
    /// record, after the new state is visible to reads.
    pub fn apply(&self, mutation: Mutation) -> DomainResult<Applied> {
        let (applied, event) = {
            let mut inner = self.inner.write().unwrap();
            match mutation {
                Mutation::PutJob(job) => Self::put_job(&mut inner, job),
                Mutation::PutLocation(location) => Self::put_location(&mut inner, location),
                Mutation::PutProfile(profile) => Self::put_profile(&mut inner, profile),
                Mutation::TransitionJob {
                    job_id,
                    expected,
                    to,
                    actor,
                } => Self::transition(&mut inner, job_id, expected, to, actor)?,
                Mutation::RemoveJob(job_id) => Self::remove_job(&mut inner, job_id)?,
            }
        };

        if let Some(event) = event {
            // No receivers is fine; nobody is watching yet.
            let _ = self.changes.send(event);
        }

        Ok(applied)
    }

    /// Conditional job transition; see [`Mutation::TransitionJob`].
    pub fn transition_job(
        &self,
        job_id: JobId,
        expected: JobStatus,
        to: JobStatus,
        actor: UserId,
    ) -> DomainResult<Job> {
        match self.apply(Mutation::TransitionJob {
            job_id,
            expected,
            to,
            actor,
        })? {
            Applied::Job(job) => Ok(job),
            other => {
                tracing::error!(?other, "transition apply returned a non-job result");
                Err(DomainError::NotFound)
            }
        }
    }

    /// Remove every job that falls outside all of `scopes`, emitting
    /// `Evict` (never `Delete`) per removed record. Returns the eviction
    /// count.
    pub fn evict_jobs_outside(&self, scopes: &[SubscriptionScope]) -> usize {
        let evicted: Vec<JobId> = {
            let mut inner = self.inner.write().unwrap();
            let evicted: Vec<JobId> = inner
                .job_order
                .iter()
                .filter(|id| {
                    inner
                        .jobs
                        .get(*id)
                        .is_some_and(|job| !scopes.iter().any(|scope| scope.covers_job(job)))
                })
                .copied()
                .collect();

            for id in &evicted {
                inner.jobs.remove(id);
            }
            inner.job_order.retain(|id| !evicted.contains(id));
            evicted
        };

        for id in &evicted {
            let _ = self.changes.send(ChangeEvent::new(
                ChangeKind::Evict,
                RecordRef::Job(*id),
            ));
        }

        evicted.len()
    }

    fn put_job(inner: &mut Inner, job: Job) -> (Applied, Option<ChangeEvent>) {
        let record = RecordRef::Job(job.id);
        match inner.jobs.get(&job.id) {
            Some(existing) if *existing == job => (Applied::Unchanged, None),
            Some(_) => {
                inner.jobs.insert(job.id, job.clone());
                (
                    Applied::Job(job),
                    Some(ChangeEvent::new(ChangeKind::Update, record)),
                )
            }
            None => {
                inner.job_order.push(job.id);
                inner.jobs.insert(job.id, job.clone());
                (
                    Applied::Job(job),
                    Some(ChangeEvent::new(ChangeKind::Insert, record)),
                )
            }
        }
    }

    fn put_location(inner: &mut Inner, location: Location) -> (Applied, Option<ChangeEvent>) {
        let record = RecordRef::Location(location.id);
        match inner.locations.get(&location.id) {
            Some(existing) if *existing == location => (Applied::Unchanged, None),
            Some(_) => {
                inner.locations.insert(location.id, location.clone());
                (
                    Applied::Location(location),
                    Some(ChangeEvent::new(ChangeKind::Update, record)),
                )
            }
            None => {
                inner.location_order.push(location.id);
                inner.locations.insert(location.id, location.clone());
                (
                    Applied::Location(location),
                    Some(ChangeEvent::new(ChangeKind::Insert, record)),
                )
            }
        }
    }

    fn put_profile(inner: &mut Inner, profile: UserProfile) -> (Applied, Option<ChangeEvent>) {
        let record = RecordRef::Profile(profile.id);
        match inner.profiles.get(&profile.id) {
            Some(existing) if *existing == profile => (Applied::Unchanged, None),
            Some(_) => {
                inner.profiles.insert(profile.id, profile.clone());
                (
                    Applied::Profile(profile),
                    Some(ChangeEvent::new(ChangeKind::Update, record)),
                )
            }
            None => {
                inner.profile_order.push(profile.id);
                inner.profiles.insert(profile.id, profile.clone());
                (
                    Applied::Profile(profile),
                    Some(ChangeEvent::new(ChangeKind::Insert, record)),
                )
            }
        }
    }

    /// The conditional write. Runs entirely under the write lock: the
    /// precondition is evaluated under the same exclusion as the commit, so
    /// "read then separately write" races cannot happen.
    fn transition(
        inner: &mut Inner,
        job_id: JobId,
        expected: JobStatus,
        to: JobStatus,
        actor: UserId,
    ) -> DomainResult<(Applied, Option<ChangeEvent>)> {
        let job = inner.jobs.get(&job_id).ok_or(DomainError::NotFound)?;

        if job.status != expected {
            return Err(DomainError::StatusChanged {
                expected,
                actual: job.status,
            });
        }

        let (status, owner) = job.plan_transition(to, actor)?;

        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(DomainError::NotFound)?;
        job.status = status;
        job.owner = owner;

        Ok((
            Applied::Job(job.clone()),
            Some(ChangeEvent::new(ChangeKind::Update, RecordRef::Job(job_id))),
        ))
    }

    fn remove_job(
        inner: &mut Inner,
        job_id: JobId,
    ) -> DomainResult<(Applied, Option<ChangeEvent>)> {
        if inner.jobs.remove(&job_id).is_none() {
            return Err(DomainError::NotFound);
        }
        inner.job_order.retain(|id| *id != job_id);

        Ok((
            Applied::Removed(job_id),
            Some(ChangeEvent::new(ChangeKind::Delete, RecordRef::Job(job_id))),
        ))
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
